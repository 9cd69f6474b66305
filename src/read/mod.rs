//! The archive reading facade.
//!
//! [`Archive::open`] locates the signature, verifies and parses the
//! header (decoding the `EncodedHeader` wrapper when present) and builds
//! the lookup tables. [`Archive::extract`] decodes one folder at a time
//! into a caller-owned [`FolderCache`] and hands out the requested
//! file's slice of it, so extracting several files of a solid block in
//! order decodes the block once.

mod blocks;
mod entry;

pub use entry::Entry;

use log::debug;

use crate::format::files::FilesInfo;
use crate::format::header::read_start_header;
use crate::format::parser::{ArchiveHeader, read_and_decode_packed_header, read_header};
use crate::format::property_id;
use crate::format::reader::HeaderCursor;
use crate::format::streams::Folder;
use crate::source::{ByteSource, LookAheadReader};
use crate::{Error, Result, checksum, codec};

use blocks::BlockIndex;

/// The caller-owned extraction cache: one decoded folder.
///
/// Passing the same cache across [`Archive::extract`] calls lets
/// consecutive files of a solid block share one decode. Dropping it
/// releases the decoded buffer.
#[derive(Debug, Default)]
pub struct FolderCache {
    folder_index: Option<u32>,
    buffer: Vec<u8>,
}

impl FolderCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the cached folder, keeping the allocation.
    pub fn clear(&mut self) {
        self.folder_index = None;
        self.buffer.clear();
    }
}

/// A 7z archive reader over an in-memory byte source.
pub struct Archive<S> {
    reader: LookAheadReader<S>,
    pack_sizes: Vec<u64>,
    #[allow(dead_code)]
    pack_crcs: Vec<Option<u32>>,
    folders: Vec<Folder>,
    files: FilesInfo,
    /// Absolute position of the first pack byte.
    data_pos: u64,
    index: BlockIndex,
}

impl<S: ByteSource> Archive<S> {
    /// Opens an archive image.
    pub fn open(source: S) -> Result<Self> {
        let mut reader = LookAheadReader::new(source);
        let start = read_start_header(&mut reader)?;

        let mut header = ArchiveHeader::default();
        if start.next_header_size != 0 {
            let header_size = usize::try_from(start.next_header_size)
                .map_err(|_| Error::Mem("header size"))?;
            let header_pos = start
                .start_pos_after_header
                .checked_add(start.next_header_offset)
                .ok_or(Error::NoArchive)?;

            reader.seek_to(header_pos)?;
            let mut header_buf = vec![0u8; header_size];
            reader.read_all(&mut header_buf)?;
            if checksum::crc32(&header_buf) != start.next_header_crc {
                return Err(Error::Archive {
                    offset: 0,
                    reason: "next header CRC mismatch".into(),
                });
            }

            let mut cursor = HeaderCursor::new(&header_buf);
            let mut tag = cursor.read_tag()?;
            let decoded_buf;
            if tag == property_id::ENCODED_HEADER {
                debug!("encoded header found, decoding");
                decoded_buf = read_and_decode_packed_header(
                    &mut cursor,
                    &mut reader,
                    start.start_pos_after_header,
                )?;
                cursor = HeaderCursor::new(&decoded_buf);
                tag = cursor.read_tag()?;
            }
            if tag != property_id::HEADER {
                return Err(Error::Unsupported("unrecognised header kind"));
            }
            header = read_header(&mut cursor)?;
        }

        let streams = header.streams.unwrap_or_default();
        let files = header.files.unwrap_or_default();
        let data_pos = start.start_pos_after_header + streams.data_offset;

        let index = BlockIndex::build(&streams.folders, &streams.pack_sizes, &files.files)?;
        debug!(
            "opened archive: {} files, {} folders, {} pack streams",
            files.files.len(),
            streams.folders.len(),
            streams.pack_sizes.len()
        );

        Ok(Self {
            reader,
            pack_sizes: streams.pack_sizes,
            pack_crcs: streams.pack_crcs,
            folders: streams.folders,
            files,
            data_pos,
            index,
        })
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.files.files.len()
    }

    /// Whether the archive holds no entries.
    pub fn is_empty(&self) -> bool {
        self.files.files.is_empty()
    }

    /// Metadata of entry `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; see [`Self::len`].
    pub fn entry(&self, index: usize) -> Entry<'_> {
        Entry {
            index,
            item: &self.files.files[index],
            name: self.file_name_utf16(index),
        }
    }

    /// Iterates over all entries.
    pub fn entries(&self) -> impl Iterator<Item = Entry<'_>> {
        (0..self.len()).map(|i| self.entry(i))
    }

    /// The UTF-16 name of entry `index`, without its terminating NUL.
    pub fn file_name_utf16(&self, index: usize) -> &[u16] {
        self.files.name_utf16(index)
    }

    /// Extracts entry `index`, returning its bytes as a slice of the
    /// cache buffer.
    ///
    /// Empty files and directories yield an empty slice. On a CRC
    /// mismatch the decoded buffer is kept in the cache for inspection
    /// and [`Error::Crc`] is returned.
    pub fn extract<'c>(
        &mut self,
        index: usize,
        cache: &'c mut FolderCache,
    ) -> Result<&'c [u8]> {
        if index >= self.files.files.len() {
            return Err(Error::Param("file index out of range"));
        }

        let Some(folder_index) = self.index.file_to_folder[index] else {
            // Empty file or directory: nothing to decode, and the cache
            // no longer names a folder.
            cache.clear();
            return Ok(&[]);
        };

        if cache.folder_index != Some(folder_index) {
            self.decode_folder_into(folder_index, cache)?;
        }

        let folder_start = self.index.folder_start_file[folder_index as usize] as usize;
        let offset: u64 = self.files.files[folder_start..index]
            .iter()
            .map(|f| f.size)
            .sum();
        let offset = usize::try_from(offset).map_err(|_| Error::Mem("file offset"))?;
        let item = &self.files.files[index];
        let size = usize::try_from(item.size).map_err(|_| Error::Mem("file size"))?;
        if offset + size > cache.buffer.len() {
            return Err(Error::Fail("file slice outside folder buffer"));
        }

        let slice = &cache.buffer[offset..offset + size];
        if let Some(crc) = item.crc {
            checksum::verify("file", crc, slice)?;
        }
        Ok(slice)
    }

    /// Decodes a whole folder into the cache.
    fn decode_folder_into(&mut self, folder_index: u32, cache: &mut FolderCache) -> Result<()> {
        let folder = &self.folders[folder_index as usize];
        let unpack_size = usize::try_from(folder.unpack_size())
            .map_err(|_| Error::Mem("folder unpack size"))?;
        let start_pos = self
            .index
            .folder_stream_pos(self.data_pos, folder_index, 0);
        let first_pack = self.index.folder_start_pack_stream[folder_index as usize] as usize;

        cache.folder_index = None;
        cache.buffer.clear();
        // One spare byte of capacity: consumers NUL-terminate symlink
        // targets in place.
        cache.buffer.reserve_exact(unpack_size + 1);
        cache.buffer.resize(unpack_size, 0);

        debug!("decoding folder {folder_index}: {unpack_size} bytes at {start_pos:#x}");
        self.reader.seek_to(start_pos)?;
        codec::decode_folder(
            folder,
            &self.pack_sizes[first_pack..],
            &mut self.reader,
            start_pos,
            &mut cache.buffer,
        )?;
        cache.folder_index = Some(folder_index);

        if let Some(crc) = folder.unpack_crc {
            checksum::verify("folder", crc, &cache.buffer)?;
        }
        Ok(())
    }
}
