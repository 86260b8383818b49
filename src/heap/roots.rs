//! GC roots: what keeps heap objects alive.
//!
//! Three sources feed the root stream, in order: strong entries of the runtime handle
//! table, the finalizer queue's root regions, and the stacks of managed threads. The
//! finalizer regions are raw arrays of pointer slots in target memory and are walked slot
//! by slot here; handle and stack roots arrive pre-enumerated from the
//! [`crate::runtime::Runtime`] boundary.

use std::sync::Arc;

use crate::{
    heap::{objects::HeapObject, snapshot::HeapSnapshot, Heap},
    runtime::HandleKind,
};

/// What kind of root keeps an object alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    /// A strong handle in the runtime handle table.
    StrongHandle,
    /// A pinning handle; the object additionally cannot move.
    PinnedHandle,
    /// The object waits for finalization and is kept alive until its finalizer runs.
    FinalizerQueue,
    /// A reference on a managed thread's stack or in its registers.
    Stack,
}

/// One GC root: a location in the target holding a reference that keeps `object` alive.
#[derive(Debug, Clone)]
pub struct Root {
    /// Address of the slot holding the rooting reference.
    pub address: u64,
    /// The rooted object.
    pub object: HeapObject,
    /// The kind of root.
    pub kind: RootKind,
}

impl Root {
    pub(crate) fn from_handle(heap: &Heap, address: u64, object: u64, kind: HandleKind) -> Root {
        Root {
            address,
            object: heap.heap_object(object),
            kind: if kind == HandleKind::Pinned {
                RootKind::PinnedHandle
            } else {
                RootKind::StrongHandle
            },
        }
    }
}

/// Lazy slot-by-slot walk over finalizer-queue regions.
///
/// Yields `(slot_address, object)` for every non-zero slot whose object's method table
/// resolves to a type; slots holding zero or unresolvable addresses are skipped.
pub(crate) struct FinalizerScan<'a> {
    heap: &'a Heap,
    snapshot: Arc<HeapSnapshot>,
    roots: bool,
    range_index: usize,
    cursor: u64,
}

impl<'a> FinalizerScan<'a> {
    pub(crate) fn new(heap: &'a Heap, snapshot: Arc<HeapSnapshot>, roots: bool) -> Self {
        FinalizerScan {
            heap,
            snapshot,
            roots,
            range_index: 0,
            cursor: 0,
        }
    }
}

impl Iterator for FinalizerScan<'_> {
    type Item = (u64, HeapObject);

    fn next(&mut self) -> Option<Self::Item> {
        let width = u64::from(self.heap.pointer_size());
        loop {
            let ranges = if self.roots {
                self.snapshot.finalizer_roots()
            } else {
                self.snapshot.finalizer_objects()
            };
            let range = *ranges.get(self.range_index)?;

            if self.cursor < range.start {
                self.cursor = range.start;
            }
            if self.cursor.saturating_add(width) > range.end {
                self.range_index += 1;
                self.cursor = 0;
                continue;
            }

            let slot = self.cursor;
            self.cursor += width;

            let object = self.heap.reader().read_pointer(slot);
            if object == 0 {
                continue;
            }

            let Some(ty) = self.heap.get_object_type(object) else {
                continue;
            };

            return Some((
                slot,
                HeapObject {
                    address: object,
                    ty: Some(ty),
                },
            ));
        }
    }
}
