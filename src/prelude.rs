//! # heapscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the heapscope library. Import this module to get quick access to the essential
//! types for managed-heap inspection.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all heapscope operations
pub use crate::Error;

/// The result type used throughout heapscope
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Main entry point for managed-heap inspection
pub use crate::heap::Heap;

/// The cached heap snapshot: segments, allocation contexts, dependent handles
pub use crate::heap::snapshot::HeapSnapshot;

// ================================================================================================
// Heap Data Model
// ================================================================================================

/// Segments and their attributes
pub use crate::heap::{HeapSegment, SegmentFlags};

/// Objects, references, and roots
pub use crate::heap::{
    objects::{HeapObject, ObjectIter},
    references::{ObjectReference, ObjectRefs, ReferenceIter, ReferenceKind},
    roots::{Root, RootKind},
};

/// Layout rules of the managed heap
pub use crate::heap::layout::{align, min_object_size, LARGE_OBJECT_THRESHOLD};

/// Walk diagnostics: opt-in per-thread step recording
pub use crate::heap::steps::{heap_walk_steps, log_heap_walk_steps, HeapWalkStep};

// ================================================================================================
// Boundary Traits and Their Data
// ================================================================================================

/// Read-only access to the target address space
pub use crate::memory::{read_range, DataReader, MemoryRange, TargetPrimitive, VersionInfo};

/// Bounds-checked cursor over lifted bytes
pub use crate::memory::parser::Parser;

/// The runtime boundary and its data model
pub use crate::runtime::{
    CommonMethodTables, DependentHandle, FinalizerQueue, GcInfo, HandleInfo, HandleKind, Runtime,
    StackRoot, ThreadInfo,
};

// ================================================================================================
// Type System Boundary
// ================================================================================================

/// Type descriptors and the factory boundary
pub use crate::types::{HeapType, HeapTypeRc, TypeFactory, WellKnownKind};

/// Reference-layout descriptors and their walker
pub use crate::types::gcdesc::{GcDesc, GcDescWalk, GcRepeat, GcSeries};

// ================================================================================================
// Module Descriptors
// ================================================================================================

/// Per-image descriptors, PE views, and PDB references
pub use crate::module::{image::PeImage, ModuleInfo, PdbInfo};

/// The MSF superblock boundary for the PDB layer
pub use crate::module::msf::{MsfHeader, MSF_MAGIC};
