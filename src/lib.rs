// Copyright 2025-2026 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # heapscope
//!
//! [![Crates.io](https://img.shields.io/crates/v/heapscope.svg)](https://crates.io/crates/heapscope)
//! [![Documentation](https://docs.rs/heapscope/badge.svg)](https://docs.rs/heapscope)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/heapscope/blob/main/LICENSE-APACHE)
//!
//! A cross-platform library for inspecting the managed (garbage-collected) heap of a
//! captured .NET process. Given read-only access to a target address space - a live
//! process or a crash dump - `heapscope` enumerates every object on the heap, its type,
//! its size, the references it holds, and the roots keeping it alive. Built in pure Rust,
//! without requiring Windows or the .NET runtime.
//!
//! # Architecture
//!
//! The library is a walker over three collaborator boundaries supplied by a data target:
//!
//! - **Memory Layer** ([`crate::memory`]) - the [`DataReader`] trait over the target
//!   address space, plus bounds-checked parsing utilities
//! - **Runtime Layer** ([`crate::runtime`]) - the [`Runtime`] trait exposing the target's
//!   GC bookkeeping: segments, allocation contexts, finalizer queues, handles, threads
//! - **Type Layer** ([`crate::types`]) - the [`TypeFactory`] trait producing type
//!   descriptors from method tables, and the GC descriptor encoding of reference layouts
//! - **Heap Layer** ([`crate::heap`]) - the [`Heap`] facade composing the above into the
//!   object, reference, and root enumeration API
//! - **Module Layer** ([`crate::module`]) - per-image descriptors with lazily latched
//!   version, managed-ness, and PDB reference
//!
//! # Key Components
//!
//! - [`crate::Heap`] - Main entry point for heap inspection
//! - [`crate::heap::snapshot::HeapSnapshot`] - Atomically published bundle of heap metadata
//! - [`crate::types::gcdesc::GcDesc`] - Per-type reference layout and its walker
//! - [`crate::ModuleInfo`] - Per-module identity and lazy facts
//! - [`crate::prelude`] - Convenient re-exports of commonly used types
//! - [`crate::Error`] and [`crate::Result`] - Error handling
//!
//! # Consistency Model
//!
//! `heapscope` takes a best-effort snapshot: it does not stop the target, so a live
//! process's heap may shift underneath it. What it guarantees is self-consistency once
//! cached - between two [`Heap::clear_cached_data`] calls every enumeration sees the same
//! segments, allocation contexts, and dependent handles, and enumeration order is
//! deterministic. Damage in the target truncates the affected stream instead of failing
//! the walk.
//!
//! # Usage Examples
//!
//! ## Walking the heap
//!
//! ```rust,ignore
//! use heapscope::prelude::*;
//!
//! let heap = Heap::new(runtime, factory)?;
//! for obj in heap.enumerate_objects()? {
//!     if let Some(ty) = &obj.ty {
//!         println!("0x{:012x} {:8} {}", obj.address,
//!                  heap.object_size(obj.address, ty), ty);
//!     }
//! }
//! # Ok::<(), heapscope::Error>(())
//! ```
//!
//! ## Tracing references
//!
//! ```rust,ignore
//! use heapscope::prelude::*;
//!
//! // `carefully` keeps the walk alive on corrupt dumps; dependent handles surface the
//! // references ConditionalWeakTable and friends would otherwise hide.
//! for reference in heap.enumerate_references_with_fields(obj, &ty, true, true)? {
//!     match reference.kind {
//!         ReferenceKind::Field { offset, .. } => {
//!             println!("  +0x{offset:x} -> {}", reference.object)
//!         }
//!         ReferenceKind::DependentHandle => println!("  (dependent) -> {}", reference.object),
//!         ReferenceKind::LoaderAllocator => println!("  (loader) -> {}", reference.object),
//!     }
//! }
//! ```
//!
//! ## Decoding an MSF superblock
//!
//! ```rust
//! use heapscope::{MsfHeader, MSF_MAGIC};
//!
//! let mut data = Vec::new();
//! data.extend_from_slice(&MSF_MAGIC);
//! for value in [0x1000u32, 1, 0x40, 0x2000, 0] {
//!     data.extend_from_slice(&value.to_le_bytes());
//! }
//! data.extend_from_slice(&0x23u32.to_le_bytes());
//!
//! let header = MsfHeader::parse(&data)?;
//! assert_eq!(header.page_size, 0x1000);
//! assert_eq!(header.directory_root, vec![0x23]);
//! # Ok::<(), heapscope::Error>(())
//! ```
//!
//! # Diagnostics
//!
//! Walking a corrupt heap fails far from the corruption. [`log_heap_walk_steps`] enables a
//! per-thread circular buffer of sizing steps; after a walk goes wrong,
//! [`heap_walk_steps`] recovers the decisions leading up to it. Recording is process-wide
//! opt-in and free when disabled.
//!
//! # Error Handling
//!
//! Data-quality problems never surface as errors mid-stream: unreadable memory reads as
//! zero, unknown method tables yield typeless objects, corrupt bookkeeping truncates the
//! affected segment. [`Result`] errors are reserved for programming errors, malformed
//! boundary structures, and infrastructure failures.
//!
//! # Thread Safety
//!
//! All public types are [`std::marker::Send`] and [`std::marker::Sync`] unless explicitly
//! documented otherwise. Heaps, snapshots, and module descriptors may be shared freely
//! across threads.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// Read-only access to the target address space: the [`DataReader`] boundary, primitive
/// decoding, bulk range reads, and the bounds-checked [`Parser`].
pub mod memory;

/// The runtime boundary: GC configuration, segments, allocation contexts, finalizer
/// queues, the handle table, and thread stack roots.
pub mod runtime;

/// Type descriptors, the [`TypeFactory`] boundary, and the GC descriptor walker.
pub mod types;

/// The managed heap: snapshotting, object enumeration, reference streams, roots, and walk
/// diagnostics.
pub mod heap;

/// Module descriptors: per-image identity, PE views, and the MSF superblock boundary.
pub mod module;

/// The result type used throughout heapscope.
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;

pub use heap::{
    objects::HeapObject,
    references::{ObjectReference, ReferenceKind},
    roots::{Root, RootKind},
    steps::{heap_walk_steps, log_heap_walk_steps, HeapWalkStep},
    Heap, HeapSegment, SegmentFlags,
};
pub use memory::{parser::Parser, DataReader, MemoryRange, VersionInfo};
pub use module::{image::PeImage, msf::MsfHeader, msf::MSF_MAGIC, ModuleInfo, PdbInfo};
pub use runtime::{GcInfo, HandleKind, Runtime};
pub use types::{HeapType, HeapTypeRc, TypeFactory, WellKnownKind};
