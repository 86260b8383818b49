//! Compact per-type encoding of reference-bearing slots and its walker.
//!
//! Every managed type whose instances contain object references carries a GC descriptor: a
//! list of slot runs within the fixed portion of an object, plus - for variable-length
//! objects such as arrays of reference-carrying structs - a repeating stride applied over
//! the element region. The walker turns a descriptor plus a concrete object (base address
//! and computed size) into a lazy stream of `(target, offset)` pairs.
//!
//! The walker reads each slot through the [`DataReader`] to obtain the stored reference and
//! skips slots holding zero (null or unreadable). It never dereferences the yielded target;
//! deciding whether a target is a valid object is the consumer's business.

use crate::{memory::DataReader, types::HeapTypeRc};

/// A run of consecutive pointer-sized reference slots inside an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcSeries {
    /// Byte offset of the first slot, relative to the object base.
    pub offset: u64,
    /// Length of the run in bytes; every pointer-aligned slot within it is a reference.
    pub size: u64,
}

/// The repeating portion of a descriptor for variable-length objects.
///
/// Starting at `offset`, the object holds elements of `stride` bytes each; within every
/// element, the offsets listed in `slots` hold references. The element count is not stored
/// here - it follows from the size of the concrete object being walked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcRepeat {
    /// Byte offset of the first element, relative to the object base.
    pub offset: u64,
    /// Size of one element in bytes.
    pub stride: u64,
    /// Reference-slot offsets within a single element.
    pub slots: Box<[u64]>,
}

/// Reference layout of a managed type.
///
/// Obtained from the type factory alongside the rest of the type descriptor. An empty
/// descriptor (no series, no repeat) means instances carry no references even if the
/// type's `contains_pointers` flag claims otherwise; the walker trusts the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GcDesc {
    /// Slot runs in the fixed portion of the object.
    pub series: Box<[GcSeries]>,
    /// Repeating element layout, for variable-length objects.
    pub repeat: Option<GcRepeat>,
}

impl GcDesc {
    /// A descriptor with no reference slots.
    #[must_use]
    pub fn empty() -> Self {
        GcDesc::default()
    }

    /// Creates a descriptor from its fixed series and optional repeating portion.
    #[must_use]
    pub fn new(series: Vec<GcSeries>, repeat: Option<GcRepeat>) -> Self {
        GcDesc {
            series: series.into_boxed_slice(),
            repeat,
        }
    }

    /// Returns `true` if the descriptor encodes no reference slots at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty() && self.repeat.is_none()
    }
}

/// Lazy walk over the reference slots of one concrete object.
///
/// Yields `(target, offset)` pairs: the reference value stored in the slot and the slot's
/// byte offset within the object. Zero-valued slots are skipped. Slots that would extend
/// past the object's computed size are ignored, so a corrupt descriptor cannot drive reads
/// outside the object.
pub struct GcDescWalk<'a> {
    ty: HeapTypeRc,
    repeat: Option<GcRepeat>,
    reader: &'a dyn DataReader,
    obj: u64,
    size: u64,
    width: u64,
    series_idx: usize,
    cursor: u64,
    elem: u64,
    slot_idx: usize,
}

impl<'a> GcDescWalk<'a> {
    /// Starts a walk over `obj` of computed `size`, using the descriptor of `ty`.
    #[must_use]
    pub fn new(ty: HeapTypeRc, reader: &'a dyn DataReader, obj: u64, size: u64) -> Self {
        let width = u64::from(reader.pointer_size().max(1));
        let repeat = ty.gc_desc.repeat.clone();
        GcDescWalk {
            ty,
            repeat,
            reader,
            obj,
            size,
            width,
            series_idx: 0,
            cursor: 0,
            elem: 0,
            slot_idx: 0,
        }
    }

    fn read_slot(&self, offset: u64) -> u64 {
        self.reader.read_pointer(self.obj.wrapping_add(offset))
    }
}

impl Iterator for GcDescWalk<'_> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        // Fixed-portion series first.
        while let Some(series) = self.ty.gc_desc.series.get(self.series_idx).copied() {
            if self.cursor < series.offset {
                self.cursor = series.offset;
            }

            let series_end = series.offset.saturating_add(series.size);
            let slot_end = self.cursor.saturating_add(self.width);
            if slot_end > series_end || slot_end > self.size {
                self.series_idx += 1;
                self.cursor = 0;
                continue;
            }

            let offset = self.cursor;
            self.cursor += self.width;

            let target = self.read_slot(offset);
            if target != 0 {
                return Some((target, offset));
            }
        }

        // Then the repeating element region.
        let repeat = self.repeat.as_ref()?;
        if repeat.stride == 0 {
            return None;
        }

        let elements = self.size.saturating_sub(repeat.offset) / repeat.stride;
        while self.elem < elements {
            while let Some(slot) = repeat.slots.get(self.slot_idx).copied() {
                self.slot_idx += 1;

                let offset = (repeat.offset + self.elem * repeat.stride).saturating_add(slot);
                if offset.saturating_add(self.width) > self.size {
                    continue;
                }

                let target = self.reader.read_pointer(self.obj.wrapping_add(offset));
                if target != 0 {
                    return Some((target, offset));
                }
            }

            self.elem += 1;
            self.slot_idx = 0;
        }

        None
    }
}
