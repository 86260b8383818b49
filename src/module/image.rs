//! Self-referential view of a PE image read out of the target address space.

use goblin::pe::{options::ParseOptions, PE};
use ouroboros::self_referencing;

use crate::{
    memory::{read_range, DataReader},
    module::PdbInfo,
    Error::GoblinErr,
    Result,
};

#[self_referencing]
/// A module's PE image, lifted out of the target and parsed.
///
/// The parsed [`PE`] borrows the raw bytes, so both travel together in one owned value;
/// dropping the image releases everything. Images are cheap snapshots scoped to the
/// operation that opened them - nothing holds target memory open behind them.
pub struct PeImage {
    /// The raw image bytes as read from the target.
    data: Vec<u8>,
    /// The parsed PE structure, referencing the data.
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl PeImage {
    /// Reads `[base, base + size)` out of the target and parses it as a PE image.
    ///
    /// `is_virtual` states whether the image is laid out as loaded in memory (section data
    /// at its virtual addresses) or as on disk (section data at file offsets); header
    /// fields are at the same place either way, but directory contents are not.
    ///
    /// Returns `None` on any failure: unreadable headers, no PE signature, or a mangled
    /// optional header. A missing tail page is tolerated - dump files drop pages that were
    /// not resident.
    #[must_use]
    pub fn from_reader(
        reader: &dyn DataReader,
        base: u64,
        size: usize,
        is_virtual: bool,
    ) -> Option<PeImage> {
        if size == 0 {
            return None;
        }

        let data = read_range(reader, base, size)?;
        Self::load(data, is_virtual).ok()
    }

    /// Parses already-lifted image bytes.
    fn load(data: Vec<u8>, is_virtual: bool) -> Result<PeImage> {
        let options = ParseOptions {
            // A loaded layout already has directory contents at their RVAs; an on-disk
            // layout needs the section table to translate them.
            resolve_rva: !is_virtual,
            ..ParseOptions::default()
        };

        PeImage::try_new(data, |data| match PE::parse_with_opts(data, &options) {
            Ok(pe) => Ok(pe),
            Err(error) => Err(GoblinErr(error)),
        })
    }

    /// Returns the total size of the lifted image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_data(|data| data.len())
    }

    /// Returns `true` if the image holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the image carries a CLR runtime header - the marker of a managed
    /// assembly.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .map(|header| header.data_directories.get_clr_runtime_header().is_some())
                .unwrap_or(false)
        })
    }

    /// The image's `SizeOfImage` field, or 0 when the optional header is missing.
    #[must_use]
    pub fn size_of_image(&self) -> u32 {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .map(|header| header.windows_fields.size_of_image)
                .unwrap_or(0)
        })
    }

    /// The COFF link timestamp of the image.
    #[must_use]
    pub fn time_date_stamp(&self) -> u32 {
        self.with_pe(|pe| pe.header.coff_header.time_date_stamp)
    }

    /// The PDB reference from the image's CodeView debug record, if it has one.
    #[must_use]
    pub fn pdb_info(&self) -> Option<PdbInfo> {
        self.with_pe(|pe| {
            let codeview = pe
                .debug_data
                .as_ref()
                .and_then(|debug| debug.codeview_pdb70_debug_info.as_ref())?;

            let path_bytes: Vec<u8> = codeview
                .filename
                .iter()
                .copied()
                .take_while(|&byte| byte != 0)
                .collect();

            Some(PdbInfo {
                path: String::from_utf8_lossy(&path_bytes).into_owned(),
                guid: codeview.signature,
                revision: codeview.age,
            })
        })
    }
}
