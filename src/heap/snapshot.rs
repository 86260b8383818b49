//! The cached heap snapshot: segments, allocation contexts, finalizer regions, dependent
//! handles.
//!
//! A snapshot is built once from the raw data the [`crate::runtime::Runtime`] reports,
//! published atomically by [`crate::heap::Heap`], and never mutated afterwards - with two
//! deliberate exceptions. The dependent-handle array is latched lazily on first use, and
//! the segment lookup keeps a last-hit index as a warm-cache hint. Both are safe under
//! concurrent readers: the latch is a [`OnceLock`], and the hint is revalidated on every
//! use, so a stale value can cost a longer search but never a wrong answer.
//!
//! Heap walks are overwhelmingly sequential, which is why the segment lookup scans
//! circularly from the hint instead of binary-searching: the next lookup is almost always
//! a hit on the same segment, making the common case O(1).

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    OnceLock,
};

use rustc_hash::FxHashMap;

use crate::{
    heap::{
        layout::{align, min_object_size},
        steps::{record_step, HeapWalkStep},
        HeapSegment,
    },
    memory::MemoryRange,
    runtime::{DependentHandle, Runtime},
    Result,
};

/// Immutable bundle of heap metadata, valid between [`crate::heap::Heap::clear_cached_data`]
/// calls.
#[derive(Debug)]
pub struct HeapSnapshot {
    segments: Box<[HeapSegment]>,
    alloc_contexts: FxHashMap<u64, u64>,
    finalizer_roots: Box<[MemoryRange]>,
    finalizer_objects: Box<[MemoryRange]>,
    dependent: OnceLock<Box<[DependentHandle]>>,
    last_segment_index: AtomicUsize,
    pointer_size: u32,
}

impl HeapSnapshot {
    /// Builds a snapshot from the runtime's raw bookkeeping.
    ///
    /// Segments are sorted by start address; segments with inconsistent bounds, and
    /// segments overlapping a predecessor, are dropped - the snapshot is a best effort
    /// over whatever the target preserved.
    ///
    /// # Errors
    ///
    /// Returns an error when the runtime cannot produce its segment list at all.
    pub(crate) fn build(runtime: &dyn Runtime, pointer_size: u32) -> Result<HeapSnapshot> {
        let mut raw = runtime.segments()?;
        raw.retain(HeapSegment::is_well_formed);
        raw.sort_by_key(|seg| seg.start);

        let mut segments: Vec<HeapSegment> = Vec::with_capacity(raw.len());
        for seg in raw {
            match segments.last() {
                Some(prev) if seg.start < prev.end => continue,
                _ => segments.push(seg),
            }
        }

        let alloc_contexts: FxHashMap<u64, u64> =
            runtime.allocation_contexts().into_iter().collect();

        let queue = runtime.finalizer_queue();

        Ok(HeapSnapshot {
            segments: segments.into_boxed_slice(),
            alloc_contexts,
            finalizer_roots: queue.roots.into_boxed_slice(),
            finalizer_objects: queue.objects.into_boxed_slice(),
            dependent: OnceLock::new(),
            last_segment_index: AtomicUsize::new(0),
            pointer_size,
        })
    }

    /// The snapshot's segments, sorted by start address, non-overlapping.
    #[must_use]
    pub fn segments(&self) -> &[HeapSegment] {
        &self.segments
    }

    /// The allocation-context map (`pointer -> limit`).
    #[must_use]
    pub fn allocation_contexts(&self) -> &FxHashMap<u64, u64> {
        &self.alloc_contexts
    }

    /// Finalizer-queue regions acting as roots.
    #[must_use]
    pub fn finalizer_roots(&self) -> &[MemoryRange] {
        &self.finalizer_roots
    }

    /// Finalizer-queue regions holding objects pending finalization.
    #[must_use]
    pub fn finalizer_objects(&self) -> &[MemoryRange] {
        &self.finalizer_objects
    }

    /// The dependent-handle array, sorted by source, latched from the runtime on first use.
    pub(crate) fn dependent_handles(&self, runtime: &dyn Runtime) -> &[DependentHandle] {
        self.dependent.get_or_init(|| {
            let mut handles = runtime.dependent_handles();
            handles.sort_by_key(|handle| handle.source);
            handles.into_boxed_slice()
        })
    }

    /// Finds the segment containing `addr`.
    ///
    /// Scans circularly from the warm-cache hint left by the previous lookup. The hint is
    /// clamped on load and only ever written after a verified hit, so a racing update can
    /// slow a lookup down but cannot make it return a segment that does not contain the
    /// address.
    #[must_use]
    pub fn segment_containing(&self, addr: u64) -> Option<&HeapSegment> {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        if addr < first.first_object || addr >= last.end {
            return None;
        }

        let count = self.segments.len();
        let start = self.last_segment_index.load(Ordering::Relaxed) % count;
        let mut index = start;
        loop {
            let seg = &self.segments[index];
            // Unsigned subtraction interpreted as signed: one comparison rejects both
            // "below start" (negative) and "past end" (>= length).
            let offset = addr.wrapping_sub(seg.start) as i64;
            if offset >= 0 && (offset as u64) < seg.len() {
                self.last_segment_index.store(index, Ordering::Relaxed);
                return Some(seg);
            }

            index = (index + 1) % count;
            if index == start {
                return None;
            }
        }
    }

    /// Advances `obj` past any allocation context starting there.
    ///
    /// Allocation contexts are bump-pointer windows reserved by threads; they contain no
    /// live objects, so a linear scan must hop over them. The hop lands one minimum-object
    /// stride past the context limit, where the segment's object stream resumes.
    ///
    /// Returns 0 when the context map does not make progress or runs past the segment end;
    /// that is the signal to abandon scanning this segment. Large-alignment segments have
    /// no allocation contexts and pass through unchanged.
    pub(crate) fn skip_allocation_context(&self, seg: &HeapSegment, mut obj: u64) -> u64 {
        if seg.uses_large_alignment() || self.alloc_contexts.is_empty() {
            return obj;
        }

        let stride = align(min_object_size(self.pointer_size), false, self.pointer_size);
        while let Some(&limit) = self.alloc_contexts.get(&obj) {
            let next = limit.saturating_add(stride);
            if obj >= next || obj >= seg.end {
                record_step(HeapWalkStep {
                    object: obj,
                    method_table: 0,
                    base_size: -1,
                    component_size: 0,
                    count: 0,
                });
                return 0;
            }
            obj = next;
        }

        obj
    }
}
