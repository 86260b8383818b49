//! Objects and the linear object scan.

use std::fmt;
use std::sync::Arc;

use crate::{
    heap::{
        layout::align,
        snapshot::HeapSnapshot,
        steps::{record_step, HeapWalkStep},
        Heap,
    },
    types::HeapTypeRc,
};

/// An object on the managed heap: its address and, when resolvable, its type.
///
/// `ty` is `None` when the object's method table did not resolve through the type factory -
/// the address is still real (something sits there), but nothing further can be said about
/// it.
#[derive(Debug, Clone)]
pub struct HeapObject {
    /// Address of the object in the target.
    pub address: u64,
    /// The object's type, when the method table resolved.
    pub ty: Option<HeapTypeRc>,
}

impl HeapObject {
    /// Returns `true` if the object's type resolved.
    #[must_use]
    pub fn is_typed(&self) -> bool {
        self.ty.is_some()
    }
}

impl fmt::Display for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            Some(ty) => write!(f, "0x{:x} {}", self.address, ty),
            None => write!(f, "0x{:x} <untyped>", self.address),
        }
    }
}

/// Lazy scan of every object on the heap, in segment order.
///
/// Produced by [`Heap::enumerate_objects`]. The scan walks each segment linearly from its
/// first object, sizing each object to find the next, hopping over allocation contexts,
/// and abandoning a segment - never the whole walk - when it runs into data it cannot
/// advance through.
pub struct ObjectIter<'a> {
    heap: &'a Heap,
    snapshot: Arc<HeapSnapshot>,
    segment_index: usize,
    cursor: u64,
    entered: bool,
}

impl<'a> ObjectIter<'a> {
    pub(crate) fn new(heap: &'a Heap, snapshot: Arc<HeapSnapshot>) -> Self {
        ObjectIter {
            heap,
            snapshot,
            segment_index: 0,
            cursor: 0,
            entered: false,
        }
    }

    fn close_segment(&mut self) {
        self.segment_index += 1;
        self.entered = false;
    }
}

impl Iterator for ObjectIter<'_> {
    type Item = HeapObject;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let seg = *self.snapshot.segments().get(self.segment_index)?;

            if !self.entered {
                let first = self.snapshot.skip_allocation_context(&seg, seg.first_object);
                if first == 0 {
                    self.close_segment();
                    continue;
                }
                self.cursor = first;
                self.entered = true;
            }

            if self.cursor >= seg.end {
                self.close_segment();
                continue;
            }

            let addr = self.cursor;
            let method_table = self.heap.reader().read_pointer(addr);
            if method_table == 0 {
                // An empty slot means the rest of the segment was never allocated.
                self.close_segment();
                continue;
            }

            let Some(ty) = self.heap.type_from_method_table(method_table, Some(addr)) else {
                // Without a type there is no size and no safe advance; surface the address
                // and move to the next segment.
                self.close_segment();
                return Some(HeapObject { address: addr, ty: None });
            };

            let (size, count) = self.heap.sized_parts(addr, &ty);
            record_step(HeapWalkStep {
                object: addr,
                method_table,
                base_size: ty.static_size as i32,
                component_size: ty.component_size,
                count,
            });

            let stepped = align(size, seg.uses_large_alignment(), self.heap.pointer_size());
            match addr.checked_add(stepped) {
                Some(next) if next > addr => {
                    let next = self.snapshot.skip_allocation_context(&seg, next);
                    if next == 0 {
                        self.close_segment();
                    } else {
                        self.cursor = next;
                    }
                }
                _ => self.close_segment(),
            }

            return Some(HeapObject {
                address: addr,
                ty: Some(ty),
            });
        }
    }
}
