//! Per-file metadata views.

use crate::format::files::{FileItem, NtfsTime};
use crate::format::attributes;

/// A borrowed view of one archive member's metadata.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub(crate) index: usize,
    pub(crate) item: &'a FileItem,
    pub(crate) name: &'a [u16],
}

impl<'a> Entry<'a> {
    /// Index of this entry within the archive.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The file name as UTF-16 code units, without a terminating NUL.
    ///
    /// Names are stored UTF-16LE on disk; converting them to anything
    /// else is left to the caller.
    pub fn name_utf16(&self) -> &'a [u16] {
        self.name
    }

    /// Uncompressed size in bytes.
    pub fn size(&self) -> u64 {
        self.item.size
    }

    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.item.is_dir
    }

    /// Whether this entry owns a slice of a folder's decoded output.
    pub fn has_stream(&self) -> bool {
        self.item.has_stream
    }

    /// CRC-32 of the file content, when the archive stores one.
    pub fn crc(&self) -> Option<u32> {
        self.item.crc
    }

    /// Windows attribute bits, when stored.
    pub fn attributes(&self) -> Option<u32> {
        self.item.attrib
    }

    /// Modification time, when stored.
    pub fn mtime(&self) -> Option<NtfsTime> {
        self.item.mtime
    }

    /// Whether the attributes mark a reparse point (symlink).
    pub fn is_reparse_point(&self) -> bool {
        self.item
            .attrib
            .is_some_and(|a| a & attributes::REPARSE_POINT != 0)
    }
}
