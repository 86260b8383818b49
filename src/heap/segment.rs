//! Heap segments: the contiguous regions the managed heap is made of.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Attributes of a heap segment, as reported by the runtime.
    pub struct SegmentFlags: u32 {
        /// The segment belongs to the large-object heap.
        const LARGE_OBJECT = 0x0001;
        /// The segment belongs to the pinned-object heap.
        const PINNED_OBJECT = 0x0002;
        /// The segment contains the ephemeral generations.
        const EPHEMERAL = 0x0004;
        /// The segment is a read-only frozen segment mapped from an image.
        const READ_ONLY = 0x0008;
    }
}

/// One contiguous region of the managed heap.
///
/// `start <= first_object <= end` always holds for segments published by a snapshot; raw
/// segments violating it are discarded during snapshot construction. Addresses in
/// `[start, first_object)` hold segment bookkeeping, not objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapSegment {
    /// First address of the segment.
    pub start: u64,
    /// Address of the first object in the segment.
    pub first_object: u64,
    /// First address past the segment's committed, object-bearing space.
    pub end: u64,
    /// Segment attributes.
    pub flags: SegmentFlags,
}

impl HeapSegment {
    /// Creates a segment from its bounds and flags.
    #[must_use]
    pub fn new(start: u64, first_object: u64, end: u64, flags: SegmentFlags) -> Self {
        HeapSegment {
            start,
            first_object,
            end,
            flags,
        }
    }

    /// Length of the segment in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.wrapping_sub(self.start)
    }

    /// Returns `true` if the segment covers no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Returns `true` if the segment belongs to the large-object heap.
    #[must_use]
    pub fn is_large_object(&self) -> bool {
        self.flags.contains(SegmentFlags::LARGE_OBJECT)
    }

    /// Returns `true` if objects in this segment use the large-object heap's 8-byte
    /// alignment and are never covered by allocation contexts.
    ///
    /// True for both the large-object and the pinned-object heap.
    #[must_use]
    pub fn uses_large_alignment(&self) -> bool {
        self.flags
            .intersects(SegmentFlags::LARGE_OBJECT | SegmentFlags::PINNED_OBJECT)
    }

    /// Returns `true` if `addr` lies within `[start, end)`.
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }

    /// Returns `true` if the segment's bounds are internally consistent.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.start <= self.first_object && self.first_object <= self.end
    }
}
