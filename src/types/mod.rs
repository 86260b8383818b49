//! Type descriptors and the type-factory boundary.
//!
//! The heap walker does not own a type system. Whenever it encounters a method table - the
//! per-type descriptor pointer stored as the first word of every managed object - it asks an
//! external [`TypeFactory`] to produce a [`HeapType`]. The factory is free to consult
//! runtime metadata, caches, or symbol files; the walker only depends on the handful of
//! fields a descriptor exposes.
//!
//! # Key Components
//!
//! - [`HeapType`] / [`HeapTypeRc`] - the per-type facts the walker needs: sizes, reference
//!   layout ([`crate::types::gcdesc::GcDesc`]), collectibility
//! - [`TypeFactory`] - inbound boundary trait producing descriptors from method tables
//! - [`WellKnownKind`] - the four types every managed heap carries, memoized by
//!   [`crate::heap::Heap`] at construction
//!
//! # Identity
//!
//! Two descriptors refer to the same type exactly when their method tables are equal. The
//! walker never compares names; names are optional cosmetic data supplied by the factory.

pub mod gcdesc;

use std::fmt;
use std::sync::Arc;

use strum::{EnumCount, EnumIter};

use crate::types::gcdesc::GcDesc;

/// Reference-counted shared type descriptor.
pub type HeapTypeRc = Arc<HeapType>;

/// The facts the heap walker needs about one managed type.
///
/// Produced by a [`TypeFactory`]; immutable once created. The walker treats the descriptor
/// as ground truth for sizing and reference enumeration, even on corrupt targets - the
/// `carefully` walking mode exists to contain the damage when the two disagree.
#[derive(Debug, Clone)]
pub struct HeapType {
    /// Address of the type's method table in the target.
    pub method_table: u64,
    /// Fully qualified type name, when the factory can resolve one.
    pub name: Option<String>,
    /// Fixed size in bytes of an instance, excluding variable-length components.
    pub static_size: u32,
    /// Size in bytes of one array element; 0 for non-array types.
    pub component_size: u32,
    /// Whether instances may contain object references.
    pub contains_pointers: bool,
    /// Whether the type lives in a collectible loader context.
    pub is_collectible: bool,
    /// For collectible types, the handle keeping the loader allocator alive.
    pub loader_allocator_handle: u64,
    /// Reference layout of instances.
    pub gc_desc: GcDesc,
}

impl HeapType {
    /// Returns `true` if instances are variable-length (arrays and strings).
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.component_size != 0
    }
}

impl PartialEq for HeapType {
    fn eq(&self, other: &Self) -> bool {
        self.method_table == other.method_table
    }
}

impl Eq for HeapType {}

impl fmt::Display for HeapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "<unknown @ MT 0x{:x}>", self.method_table),
        }
    }
}

/// The four types every managed heap carries.
///
/// Their method tables are published by the runtime as part of its global bookkeeping, and
/// the heap memoizes a descriptor for each at construction so hot paths (free-space
/// detection, string sizing) never round-trip through the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount, EnumIter)]
pub enum WellKnownKind {
    /// The free-space filler type marking unused gaps between live objects.
    Free,
    /// `System.Object`.
    Object,
    /// `System.String`.
    String,
    /// `System.Exception`.
    Exception,
}

impl WellKnownKind {
    /// The canonical runtime name of the type.
    #[must_use]
    pub fn canonical_name(&self) -> &'static str {
        match self {
            WellKnownKind::Free => "Free",
            WellKnownKind::Object => "System.Object",
            WellKnownKind::String => "System.String",
            WellKnownKind::Exception => "System.Exception",
        }
    }
}

/// Inbound boundary: produces type descriptors from method tables.
///
/// Implemented by the metadata layer of a data target. All implementations must be
/// thread-safe; the heap calls into the factory from concurrent enumeration streams.
pub trait TypeFactory: Send + Sync {
    /// Resolves the type for `method_table`, or `None` when the value does not refer to a
    /// valid method table in the target.
    ///
    /// `obj_hint` carries the address of the object the method table was read from, when
    /// there is one; factories can use it to disambiguate generic instantiations.
    fn get_or_create_type(&self, method_table: u64, obj_hint: Option<u64>) -> Option<HeapTypeRc>;

    /// Produces the descriptor for one of the well-known types.
    ///
    /// Unlike [`TypeFactory::get_or_create_type`] this cannot fail: the four well-known
    /// method tables come from the runtime's own global bookkeeping, and a factory that
    /// cannot describe them cannot describe anything. Called once per kind at heap
    /// construction.
    fn create_well_known_type(&self, method_table: u64, kind: WellKnownKind) -> HeapTypeRc;
}
