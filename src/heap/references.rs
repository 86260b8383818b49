//! Outgoing references of a single object.
//!
//! The reference stream of an object has up to three legs, in a fixed order: targets of
//! dependent handles whose source is the object, the loader allocator of a collectible
//! type, and finally the references found in the object's fields via its GC descriptor.
//! The field leg is where corrupt targets bite, so it is the one guarded by the `carefully`
//! mode: when the object does not sit inside a known segment, overruns its segment, or
//! claims a large-object size outside the large-object heap, the field leg is dropped and
//! the stream simply ends.

use std::sync::Arc;

use crate::{
    heap::{layout::LARGE_OBJECT_THRESHOLD, objects::HeapObject, snapshot::HeapSnapshot, Heap},
    types::{gcdesc::GcDescWalk, HeapTypeRc},
};

/// How a reference is held by the referencing object.
#[derive(Debug, Clone)]
pub enum ReferenceKind {
    /// The reference is the target of a dependent handle whose source is the object.
    DependentHandle,
    /// The reference keeps a collectible type's loader allocator alive.
    LoaderAllocator,
    /// The reference sits in a field of the object.
    Field {
        /// The type containing the field.
        container: HeapTypeRc,
        /// Byte offset of the field within the object.
        offset: u64,
    },
}

/// One outgoing reference, with the metadata describing how it is held.
#[derive(Debug, Clone)]
pub struct ObjectReference {
    /// The referenced object.
    pub object: HeapObject,
    /// How the reference is held.
    pub kind: ReferenceKind,
}

/// Lazy stream of an object's outgoing references with field metadata.
///
/// Produced by [`Heap::enumerate_references_with_fields`].
pub struct ReferenceIter<'a> {
    heap: &'a Heap,
    snapshot: Arc<HeapSnapshot>,
    ty: HeapTypeRc,
    dh_next: usize,
    dh_end: usize,
    loader: Option<u64>,
    walk: Option<GcDescWalk<'a>>,
}

impl<'a> ReferenceIter<'a> {
    pub(crate) fn new(
        heap: &'a Heap,
        snapshot: Arc<HeapSnapshot>,
        obj: u64,
        ty: HeapTypeRc,
        carefully: bool,
        consider_dependent_handles: bool,
    ) -> Self {
        let (dh_next, dh_end) = if consider_dependent_handles {
            let handles = snapshot.dependent_handles(heap.runtime().as_ref());
            let lo = handles.partition_point(|h| h.source < obj);
            let hi = handles.partition_point(|h| h.source <= obj);
            (lo, hi)
        } else {
            (0, 0)
        };

        let loader = if ty.is_collectible {
            match heap.reader().read_pointer(ty.loader_allocator_handle) {
                0 => None,
                allocator => Some(allocator),
            }
        } else {
            None
        };

        let walk = Self::field_walk(heap, &snapshot, obj, &ty, carefully);

        ReferenceIter {
            heap,
            snapshot,
            ty,
            dh_next,
            dh_end,
            loader,
            walk,
        }
    }

    /// Sets up the field leg, applying the careful-mode guards.
    fn field_walk(
        heap: &'a Heap,
        snapshot: &HeapSnapshot,
        obj: u64,
        ty: &HeapTypeRc,
        carefully: bool,
    ) -> Option<GcDescWalk<'a>> {
        if !ty.contains_pointers || ty.gc_desc.is_empty() {
            return None;
        }

        let size = heap.object_size(obj, ty);

        if carefully {
            let seg = snapshot.segment_containing(obj)?;
            if obj.checked_add(size)? > seg.end {
                return None;
            }
            // Only the large-object heap legitimately holds objects past the threshold;
            // pinned-object segments are 8-aligned but still small-object sized.
            if !seg.is_large_object() && size > LARGE_OBJECT_THRESHOLD {
                return None;
            }
        }

        Some(GcDescWalk::new(
            ty.clone(),
            heap.reader_dyn(),
            obj,
            size,
        ))
    }
}

impl Iterator for ReferenceIter<'_> {
    type Item = ObjectReference;

    fn next(&mut self) -> Option<Self::Item> {
        if self.dh_next < self.dh_end {
            let handles = self.snapshot.dependent_handles(self.heap.runtime().as_ref());
            let target = handles[self.dh_next].target;
            self.dh_next += 1;
            return Some(ObjectReference {
                object: self.heap.heap_object(target),
                kind: ReferenceKind::DependentHandle,
            });
        }

        if let Some(allocator) = self.loader.take() {
            return Some(ObjectReference {
                object: self.heap.heap_object(allocator),
                kind: ReferenceKind::LoaderAllocator,
            });
        }

        let (target, offset) = self.walk.as_mut()?.next()?;
        Some(ObjectReference {
            object: self.heap.heap_object(target),
            kind: ReferenceKind::Field {
                container: self.ty.clone(),
                offset,
            },
        })
    }
}

/// Lazy stream of an object's outgoing references, without field metadata.
///
/// Produced by [`Heap::enumerate_object_references`]; the same stream as
/// [`ReferenceIter`], stripped to the referenced objects.
pub struct ObjectRefs<'a>(pub(crate) ReferenceIter<'a>);

impl Iterator for ObjectRefs<'_> {
    type Item = HeapObject;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|reference| reference.object)
    }
}
