//! The managed heap and its enumeration API.
//!
//! This module provides the central [`Heap`] type: a read-only view of the garbage-collected
//! heap of a captured process, built on three collaborator boundaries - the
//! [`crate::memory::DataReader`] for raw bytes, the [`crate::runtime::Runtime`] for GC
//! bookkeeping, and the [`crate::types::TypeFactory`] for type descriptors.
//!
//! # Architecture
//!
//! The heap composes a handful of focused pieces:
//!
//! - **Snapshot cache** ([`crate::heap::snapshot::HeapSnapshot`]) - segments, allocation
//!   contexts, finalizer regions, and dependent handles, built once on demand and published
//!   atomically; dropped by [`Heap::clear_cached_data`]
//! - **Layout rules** ([`crate::heap::layout`]) - alignment regimes, the minimum object
//!   size, and the large-object threshold
//! - **Object scan** ([`crate::heap::objects::ObjectIter`]) - linear sweep over every
//!   segment, sizing each object to find the next
//! - **Reference streams** ([`crate::heap::references::ReferenceIter`]) - dependent
//!   handles, loader allocators, and GC-descriptor fields of a single object
//! - **Roots** ([`crate::heap::roots`]) - strong handles, finalizer queue, thread stacks
//! - **Walk diagnostics** ([`crate::heap::steps`]) - opt-in per-thread step recording
//!
//! # Consistency Model
//!
//! The heap is a best-effort snapshot, not a transactional view: walking a live process
//! races against its allocator. What the heap does guarantee is self-consistency once data
//! is cached - between two [`Heap::clear_cached_data`] calls, every enumeration sees the
//! same segments, contexts, and dependent handles, and repeated enumerations yield
//! identical sequences as long as the underlying reader is stable.
//!
//! # Examples
//!
//! ```rust,ignore
//! use heapscope::Heap;
//!
//! let heap = Heap::new(runtime, factory)?;
//! for obj in heap.enumerate_objects()? {
//!     match &obj.ty {
//!         Some(ty) => println!("0x{:x} {} ({} bytes)", obj.address, ty,
//!                              heap.object_size(obj.address, ty)),
//!         None => println!("0x{:x} <unknown method table>", obj.address),
//!     }
//! }
//! ```

pub mod layout;
pub mod objects;
pub mod references;
pub mod roots;
pub mod segment;
pub mod snapshot;
pub mod steps;

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use strum::IntoEnumIterator;

use crate::{
    heap::{
        layout::min_object_size,
        objects::{HeapObject, ObjectIter},
        references::{ObjectRefs, ReferenceIter},
        roots::{FinalizerScan, Root, RootKind},
        snapshot::HeapSnapshot,
    },
    memory::DataReader,
    runtime::Runtime,
    types::{HeapType, HeapTypeRc, TypeFactory, WellKnownKind},
    Error, Result,
};

pub use segment::{HeapSegment, SegmentFlags};

/// A read-only view of the managed heap of a captured process.
///
/// Construction queries the runtime's GC configuration once and memoizes the four
/// well-known types; everything else is lazy. All methods are safe to call from multiple
/// threads concurrently.
pub struct Heap {
    runtime: Arc<dyn Runtime>,
    factory: Arc<dyn TypeFactory>,
    reader: Arc<dyn DataReader>,
    snapshot: RwLock<Option<Arc<HeapSnapshot>>>,
    type_memo: DashMap<u64, HeapTypeRc>,
    free_type: HeapTypeRc,
    object_type: HeapTypeRc,
    string_type: HeapTypeRc,
    exception_type: HeapTypeRc,
    is_server: bool,
    logical_heap_count: u32,
    can_walk_heap: bool,
    pointer_size: u32,
}

impl Heap {
    /// Creates a heap over `runtime`, resolving types through `factory`.
    ///
    /// # Errors
    ///
    /// Returns an error when the runtime cannot report its GC configuration, or when the
    /// data reader reports a pointer width other than 4 or 8 bytes.
    pub fn new(runtime: Arc<dyn Runtime>, factory: Arc<dyn TypeFactory>) -> Result<Heap> {
        let reader = runtime.data_reader().clone();
        let pointer_size = reader.pointer_size();
        if pointer_size != 4 && pointer_size != 8 {
            return Err(Error::NotSupported);
        }

        let info = runtime.gc_info()?;

        let type_memo = DashMap::new();
        let memoize = |kind: WellKnownKind| {
            let method_table = info.common_method_tables.method_table(kind);
            let ty = factory.create_well_known_type(method_table, kind);
            type_memo.insert(method_table, ty.clone());
            ty
        };

        let free_type = memoize(WellKnownKind::Free);
        let object_type = memoize(WellKnownKind::Object);
        let string_type = memoize(WellKnownKind::String);
        let exception_type = memoize(WellKnownKind::Exception);

        Ok(Heap {
            runtime,
            factory,
            reader,
            snapshot: RwLock::new(None),
            type_memo,
            free_type,
            object_type,
            string_type,
            exception_type,
            is_server: info.is_server,
            logical_heap_count: info.logical_heap_count,
            can_walk_heap: info.can_walk_heap,
            pointer_size,
        })
    }

    /// The runtime this heap belongs to.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    /// The reader over the target address space.
    #[must_use]
    pub fn reader(&self) -> &Arc<dyn DataReader> {
        &self.reader
    }

    pub(crate) fn reader_dyn(&self) -> &dyn DataReader {
        self.reader.as_ref()
    }

    /// Width of a target pointer in bytes.
    #[must_use]
    pub fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    /// Whether the target runs the server flavor of the GC.
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// Number of logical GC heaps in the target.
    #[must_use]
    pub fn logical_heap_count(&self) -> u32 {
        self.logical_heap_count
    }

    /// Whether the target's GC state was consistent enough at capture time for a full walk.
    ///
    /// Enumeration stays available either way; on an inconsistent target it degrades to
    /// best effort.
    #[must_use]
    pub fn can_walk_heap(&self) -> bool {
        self.can_walk_heap
    }

    /// The free-space filler type.
    #[must_use]
    pub fn free_type(&self) -> &HeapTypeRc {
        &self.free_type
    }

    /// The `System.Object` type.
    #[must_use]
    pub fn object_type(&self) -> &HeapTypeRc {
        &self.object_type
    }

    /// The `System.String` type.
    #[must_use]
    pub fn string_type(&self) -> &HeapTypeRc {
        &self.string_type
    }

    /// The `System.Exception` type.
    #[must_use]
    pub fn exception_type(&self) -> &HeapTypeRc {
        &self.exception_type
    }

    /// The memoized descriptor for a well-known kind.
    #[must_use]
    pub fn well_known_type(&self, kind: WellKnownKind) -> &HeapTypeRc {
        match kind {
            WellKnownKind::Free => &self.free_type,
            WellKnownKind::Object => &self.object_type,
            WellKnownKind::String => &self.string_type,
            WellKnownKind::Exception => &self.exception_type,
        }
    }

    /// The current heap snapshot, building and publishing it if none is cached.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot lock is poisoned or the runtime cannot produce
    /// its segment list.
    pub fn snapshot(&self) -> Result<Arc<HeapSnapshot>> {
        {
            let cached = self.snapshot.read().map_err(|_| Error::LockError)?;
            if let Some(snapshot) = cached.as_ref() {
                return Ok(snapshot.clone());
            }
        }

        let mut slot = self.snapshot.write().map_err(|_| Error::LockError)?;
        // Double-check: another thread may have built while this one waited on the lock.
        if let Some(snapshot) = slot.as_ref() {
            return Ok(snapshot.clone());
        }

        let built = Arc::new(HeapSnapshot::build(self.runtime.as_ref(), self.pointer_size)?);
        *slot = Some(built.clone());
        Ok(built)
    }

    /// Drops all cached heap data; the next enumeration rebuilds from the runtime.
    ///
    /// Streams already holding the previous snapshot keep it until they are dropped.
    pub fn clear_cached_data(&self) {
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = None;
        }

        self.type_memo.clear();
        for kind in WellKnownKind::iter() {
            let ty = self.well_known_type(kind).clone();
            self.type_memo.insert(ty.method_table, ty);
        }
    }

    /// Resolves the type of the object at `addr` by reading its method table.
    ///
    /// Returns `None` when the method table reads as zero (unreadable or empty slot) or
    /// does not resolve through the type factory.
    #[must_use]
    pub fn get_object_type(&self, addr: u64) -> Option<HeapTypeRc> {
        let method_table = self.reader.read_pointer(addr);
        if method_table == 0 {
            return None;
        }
        self.type_from_method_table(method_table, Some(addr))
    }

    /// Read-through memoized factory lookup.
    pub(crate) fn type_from_method_table(
        &self,
        method_table: u64,
        obj_hint: Option<u64>,
    ) -> Option<HeapTypeRc> {
        if let Some(ty) = self.type_memo.get(&method_table) {
            return Some(ty.value().clone());
        }

        let ty = self.factory.get_or_create_type(method_table, obj_hint)?;
        self.type_memo.insert(method_table, ty.clone());
        Some(ty)
    }

    pub(crate) fn heap_object(&self, addr: u64) -> HeapObject {
        HeapObject {
            address: addr,
            ty: self.get_object_type(addr),
        }
    }

    /// Size in bytes of the object at `addr`, given its type.
    ///
    /// Fixed-size types report their static size; variable-length types read the element
    /// count stored in the object, with strings corrected for the trailing null their
    /// stored length omits. No size is ever below three pointers. The reported size is the
    /// object's own extent - heap alignment padding is not included.
    #[must_use]
    pub fn object_size(&self, addr: u64, ty: &HeapType) -> u64 {
        self.sized_parts(addr, ty).0
    }

    /// Size plus the (string-corrected) element count that produced it.
    pub(crate) fn sized_parts(&self, addr: u64, ty: &HeapType) -> (u64, u32) {
        let floor = min_object_size(self.pointer_size);

        if ty.component_size == 0 {
            return (u64::from(ty.static_size).max(floor), 0);
        }

        let count_addr = addr.saturating_add(u64::from(self.pointer_size));
        let mut count = self.reader.read_u32(count_addr);
        if ty.method_table == self.string_type.method_table {
            // Stored string lengths omit the trailing null character.
            count = count.saturating_add(1);
        }

        let size = u64::from(count) * u64::from(ty.component_size) + u64::from(ty.static_size);
        (size.max(floor), count)
    }

    /// The heap's segments, sorted by start address.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be built.
    pub fn segments(&self) -> Result<Vec<HeapSegment>> {
        Ok(self.snapshot()?.segments().to_vec())
    }

    /// Finds the segment containing `addr`, if any.
    ///
    /// Snapshot failures flatten to `None`; use [`Heap::snapshot`] directly to observe
    /// them.
    #[must_use]
    pub fn segment_containing(&self, addr: u64) -> Option<HeapSegment> {
        self.snapshot().ok()?.segment_containing(addr).copied()
    }

    /// Enumerates every object on the heap, in segment order.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be built; the returned stream itself
    /// never fails, it truncates around damage instead.
    pub fn enumerate_objects(&self) -> Result<ObjectIter<'_>> {
        Ok(ObjectIter::new(self, self.snapshot()?))
    }

    /// Enumerates the outgoing references of the object at `obj`.
    ///
    /// `carefully` trades completeness for robustness: the field pass is dropped when the
    /// object does not lie in a known segment, overruns it, or claims an implausible size.
    /// `consider_dependent_handles` prepends the targets of dependent handles whose source
    /// is `obj`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] for a type with a zero method table, or a
    /// snapshot failure.
    pub fn enumerate_object_references(
        &self,
        obj: u64,
        ty: &HeapTypeRc,
        carefully: bool,
        consider_dependent_handles: bool,
    ) -> Result<ObjectRefs<'_>> {
        Ok(ObjectRefs(self.enumerate_references_with_fields(
            obj,
            ty,
            carefully,
            consider_dependent_handles,
        )?))
    }

    /// Like [`Heap::enumerate_object_references`], with each reference carrying the
    /// metadata of how it is held (dependent handle, loader allocator, or containing field
    /// and offset).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArgument`] for a type with a zero method table, or a
    /// snapshot failure.
    pub fn enumerate_references_with_fields(
        &self,
        obj: u64,
        ty: &HeapTypeRc,
        carefully: bool,
        consider_dependent_handles: bool,
    ) -> Result<ReferenceIter<'_>> {
        if ty.method_table == 0 {
            return Err(Error::InvalidArgument("type has a zero method table"));
        }

        Ok(ReferenceIter::new(
            self,
            self.snapshot()?,
            obj,
            ty.clone(),
            carefully,
            consider_dependent_handles,
        ))
    }

    /// Enumerates every GC root: strong handles, then finalizer roots, then thread stacks.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be built.
    pub fn enumerate_roots(&self) -> Result<impl Iterator<Item = Root> + '_> {
        let snapshot = self.snapshot()?;

        let handle_roots = self
            .runtime
            .handles()
            .into_iter()
            .filter(|handle| handle.kind.is_strong())
            .map(move |handle| Root::from_handle(self, handle.address, handle.object, handle.kind));

        let finalizer_roots =
            FinalizerScan::new(self, snapshot, true).map(|(slot, object)| Root {
                address: slot,
                object,
                kind: RootKind::FinalizerQueue,
            });

        let stack_roots = self.runtime.threads().into_iter().flat_map(move |thread| {
            self.runtime
                .stack_roots(&thread)
                .into_iter()
                .map(move |root| Root {
                    address: root.address,
                    object: self.heap_object(root.object),
                    kind: RootKind::Stack,
                })
        });

        Ok(handle_roots.chain(finalizer_roots).chain(stack_roots))
    }

    /// Enumerates the finalizer-queue roots alone: objects reachable only because their
    /// finalizers have not run yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be built.
    pub fn enumerate_finalizer_roots(&self) -> Result<impl Iterator<Item = Root> + '_> {
        let snapshot = self.snapshot()?;
        Ok(
            FinalizerScan::new(self, snapshot, true).map(|(slot, object)| Root {
                address: slot,
                object,
                kind: RootKind::FinalizerQueue,
            }),
        )
    }

    /// Enumerates objects pending finalization: already unreachable through normal roots,
    /// waiting for their finalizers to run.
    ///
    /// # Errors
    ///
    /// Returns an error when the snapshot cannot be built.
    pub fn enumerate_finalizable_objects(
        &self,
    ) -> Result<impl Iterator<Item = HeapObject> + '_> {
        let snapshot = self.snapshot()?;
        Ok(FinalizerScan::new(self, snapshot, false).map(|(_, object)| object))
    }
}
