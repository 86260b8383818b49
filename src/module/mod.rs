//! Module descriptors: the per-image snapshot a data target publishes.
//!
//! A [`ModuleInfo`] captures the identity of one loaded image - base address, the
//! size/timestamp pair used for symbol-server lookup, file name, layout flavor, and (on
//! Linux targets) the build id. Everything beyond identity is computed lazily and latched:
//! the file version, whether the image is managed, and its PDB reference. Lazy fields are
//! safe under concurrent first access; initialization is effectively at-most-once.
//!
//! # Key Components
//!
//! - [`ModuleInfo`] - the descriptor itself
//! - [`crate::module::image::PeImage`] - a parsed PE view lifted out of the target
//! - [`PdbInfo`] - a complete PDB reference (path, GUID, age)
//! - [`crate::module::msf::MsfHeader`] - the MSF superblock boundary for the PDB layer

pub mod image;
pub mod msf;

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::{
    memory::{DataReader, VersionInfo},
    module::image::PeImage,
};

/// A complete reference to a module's PDB: enough to locate the matching symbol file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbInfo {
    /// Path of the PDB as recorded at build time.
    pub path: String,
    /// The PDB's unique signature.
    pub guid: [u8; 16],
    /// The PDB's age (revision counter bumped on incremental links).
    pub revision: u32,
}

impl fmt::Display for PdbInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.guid {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "-{:x} {}", self.revision, self.path)
    }
}

/// Per-module snapshot: identity plus lazily latched facts.
///
/// Created by the data target when it enumerates the target's loaded images; immutable
/// afterwards except for the lazy fields, which latch once.
pub struct ModuleInfo {
    reader: Arc<dyn DataReader>,
    image_base: u64,
    index_file_size: u32,
    index_timestamp: u32,
    file_name: Option<String>,
    is_virtual: bool,
    build_id: Option<Vec<u8>>,
    version: OnceLock<Option<VersionInfo>>,
    managed: OnceLock<bool>,
    pdb: OnceLock<Option<PdbInfo>>,
}

impl ModuleInfo {
    /// Creates a descriptor from the facts the data target knows at enumeration time.
    ///
    /// `index_file_size` and `index_timestamp` are the PE `SizeOfImage` and link timestamp
    /// used for symbol-server lookup. `is_virtual` states whether the image bytes in the
    /// target follow the loaded layout (sections at virtual addresses) or the on-disk one.
    #[must_use]
    pub fn new(
        reader: Arc<dyn DataReader>,
        image_base: u64,
        index_file_size: u32,
        index_timestamp: u32,
        file_name: Option<String>,
        is_virtual: bool,
    ) -> ModuleInfo {
        ModuleInfo {
            reader,
            image_base,
            index_file_size,
            index_timestamp,
            file_name,
            is_virtual,
            build_id: None,
            version: OnceLock::new(),
            managed: OnceLock::new(),
            pdb: OnceLock::new(),
        }
    }

    /// Attaches the ELF build id of the image (Linux targets).
    #[must_use]
    pub fn with_build_id(mut self, build_id: Vec<u8>) -> Self {
        self.build_id = Some(build_id);
        self
    }

    /// Pre-latches the file version, for targets that already know it.
    #[must_use]
    pub fn with_version(self, version: VersionInfo) -> Self {
        let _ = self.version.set(Some(version));
        self
    }

    /// Base address the image is loaded at.
    #[must_use]
    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    /// The PE `SizeOfImage`, as used for symbol-server lookup.
    #[must_use]
    pub fn index_file_size(&self) -> u32 {
        self.index_file_size
    }

    /// The PE link timestamp, as used for symbol-server lookup.
    #[must_use]
    pub fn index_timestamp(&self) -> u32 {
        self.index_timestamp
    }

    /// File name of the image, when known.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Whether the image bytes follow the loaded layout.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// The ELF build id, when the target recorded one.
    #[must_use]
    pub fn build_id(&self) -> Option<&[u8]> {
        self.build_id.as_deref()
    }

    /// The image's file version: pre-supplied by the target, or queried from the reader on
    /// first access and latched.
    #[must_use]
    pub fn version(&self) -> Option<VersionInfo> {
        *self
            .version
            .get_or_init(|| self.reader.version_info(self.image_base))
    }

    /// Opens a fresh PE view over the image's bytes in the target.
    ///
    /// Returns `None` when the image cannot be read or parsed. As a side effect a
    /// successful open latches [`ModuleInfo::is_managed`].
    #[must_use]
    pub fn pe_image(&self) -> Option<PeImage> {
        let image = PeImage::from_reader(
            self.reader.as_ref(),
            self.image_base,
            self.index_file_size as usize,
            self.is_virtual,
        )?;

        let _ = self.managed.set(image.is_managed());
        Some(image)
    }

    /// Whether the image is a managed assembly.
    ///
    /// Computed from the PE image on first call and latched; an unreadable image reports
    /// `false` without latching, so a later call can still succeed.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        if let Some(&managed) = self.managed.get() {
            return managed;
        }

        let _ = self.pe_image();
        self.managed.get().copied().unwrap_or(false)
    }

    /// The module's PDB reference from its CodeView debug record, latched on first access.
    #[must_use]
    pub fn pdb(&self) -> Option<PdbInfo> {
        self.pdb
            .get_or_init(|| self.pe_image().and_then(|image| image.pdb_info()))
            .clone()
    }
}

impl fmt::Debug for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInfo")
            .field("image_base", &self.image_base)
            .field("index_file_size", &self.index_file_size)
            .field("index_timestamp", &self.index_timestamp)
            .field("file_name", &self.file_name)
            .field("is_virtual", &self.is_virtual)
            .finish_non_exhaustive()
    }
}
