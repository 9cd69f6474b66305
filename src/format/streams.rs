//! Pack, folder and substream sections of the 7z header.
//!
//! A folder is a decoder pipeline: coders plus the bind pairs wiring
//! coder outputs to coder inputs and the pack streams feeding the
//! remaining inputs from the archive body.

use crate::{Error, Result};

use super::property_id;
use super::reader::HeaderCursor;

/// Upper bound on coders per folder.
pub const NUM_FOLDER_CODERS_MAX: u32 = 32;
/// Upper bound on streams per coder.
pub const NUM_CODER_STREAMS_MAX: u32 = 32;

/// A single coder inside a folder.
#[derive(Debug, Clone)]
pub struct Coder {
    /// Method identifier, packed big-endian from the header id bytes.
    pub method_id: u64,
    /// Number of input streams (1 except for BCJ2's 4).
    pub num_in_streams: u32,
    /// Number of output streams.
    pub num_out_streams: u32,
    /// Opaque codec properties (5 bytes for LZMA, 1 for LZMA2).
    pub props: Vec<u8>,
}

/// Connects the output of one coder to the input of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindPair {
    /// Global input stream index.
    pub in_index: u32,
    /// Global output stream index.
    pub out_index: u32,
}

/// A decoder pipeline description.
#[derive(Debug, Clone, Default)]
pub struct Folder {
    /// Coders in header order.
    pub coders: Vec<Coder>,
    /// Output-to-input wiring.
    pub bind_pairs: Vec<BindPair>,
    /// Input stream index fed by each pack stream, in pack order.
    pub packed_streams: Vec<u32>,
    /// Unpacked size of every coder output stream.
    pub unpack_sizes: Vec<u64>,
    /// CRC-32 of the folder's final output, when stored.
    pub unpack_crc: Option<u32>,
    /// Number of files carved out of this folder's output.
    pub num_unpack_streams: u32,
}

impl Default for Coder {
    fn default() -> Self {
        Self {
            method_id: 0,
            num_in_streams: 1,
            num_out_streams: 1,
            props: Vec::new(),
        }
    }
}

impl Folder {
    /// Parses one folder definition.
    pub(crate) fn parse(c: &mut HeaderCursor<'_>) -> Result<Self> {
        let num_coders = c.read_number32()?;
        if num_coders == 0 || num_coders > NUM_FOLDER_CODERS_MAX {
            return Err(Error::Unsupported("folder coder count"));
        }

        let mut coders = Vec::with_capacity(num_coders as usize);
        let mut num_in_streams = 0u32;
        let mut num_out_streams = 0u32;

        for _ in 0..num_coders {
            let main_byte = c.read_u8()?;
            let id_size = (main_byte & 0x0F) as usize;
            if id_size > 8 {
                return Err(Error::Unsupported("method id length"));
            }
            let id_bytes = c.read_bytes(id_size)?;
            let mut method_id = 0u64;
            for &b in id_bytes {
                method_id = (method_id << 8) | b as u64;
            }

            let mut coder = Coder {
                method_id,
                ..Coder::default()
            };
            if main_byte & 0x10 != 0 {
                coder.num_in_streams = c.read_number32()?;
                coder.num_out_streams = c.read_number32()?;
                if coder.num_in_streams > NUM_CODER_STREAMS_MAX
                    || coder.num_out_streams > NUM_CODER_STREAMS_MAX
                {
                    return Err(Error::Unsupported("coder stream count"));
                }
            }
            if main_byte & 0x20 != 0 {
                let props_size = c.read_number()?;
                if props_size > c.remaining() as u64 {
                    return c.corrupt("coder properties overflow header".into());
                }
                coder.props = c.read_bytes(props_size as usize)?.to_vec();
            }

            // Alternative method descriptors: accepted and discarded.
            let mut alt = main_byte;
            while alt & 0x80 != 0 {
                alt = c.read_u8()?;
                c.skip((alt & 0x0F) as u64)?;
                if alt & 0x10 != 0 {
                    c.read_number32()?;
                    c.read_number32()?;
                }
                if alt & 0x20 != 0 {
                    let size = c.read_number()?;
                    c.skip(size)?;
                }
            }

            num_in_streams += coder.num_in_streams;
            num_out_streams += coder.num_out_streams;
            coders.push(coder);
        }

        if num_out_streams == 0 {
            return Err(Error::Unsupported("folder without output streams"));
        }

        let num_bind_pairs = num_out_streams - 1;
        let mut bind_pairs = Vec::with_capacity(num_bind_pairs as usize);
        for _ in 0..num_bind_pairs {
            let in_index = c.read_number32()?;
            let out_index = c.read_number32()?;
            if in_index >= num_in_streams || out_index >= num_out_streams {
                return c.corrupt("bind pair index out of range".into());
            }
            bind_pairs.push(BindPair { in_index, out_index });
        }

        if num_in_streams < num_bind_pairs {
            return Err(Error::Unsupported("more bind pairs than inputs"));
        }
        let num_pack_streams = num_in_streams - num_bind_pairs;

        let mut folder = Folder {
            coders,
            bind_pairs,
            ..Folder::default()
        };

        if num_pack_streams == 1 {
            // The single pack stream feeds the one input no bind pair
            // covers.
            let index = (0..num_in_streams)
                .find(|&i| folder.find_bind_pair_for_in_stream(i).is_none());
            match index {
                Some(i) => folder.packed_streams.push(i),
                None => return Err(Error::Unsupported("no unbound input stream")),
            }
        } else {
            for _ in 0..num_pack_streams {
                folder.packed_streams.push(c.read_number32()?);
            }
        }

        Ok(folder)
    }

    /// Total output streams across all coders.
    pub fn num_out_streams_total(&self) -> u32 {
        self.coders.iter().map(|c| c.num_out_streams).sum()
    }

    /// Total input streams across all coders.
    pub fn num_in_streams_total(&self) -> u32 {
        self.coders.iter().map(|c| c.num_in_streams).sum()
    }

    /// Finds the bind pair consuming global input stream `index`.
    pub fn find_bind_pair_for_in_stream(&self, index: u32) -> Option<usize> {
        self.bind_pairs.iter().position(|bp| bp.in_index == index)
    }

    /// Finds the bind pair fed by global output stream `index`.
    pub fn find_bind_pair_for_out_stream(&self, index: u32) -> Option<usize> {
        self.bind_pairs.iter().position(|bp| bp.out_index == index)
    }

    /// Size of the folder's final output: the unique output stream not
    /// consumed by any bind pair.
    pub fn unpack_size(&self) -> u64 {
        for i in (0..self.num_out_streams_total()).rev() {
            if self.find_bind_pair_for_out_stream(i).is_none() {
                return self.unpack_sizes.get(i as usize).copied().unwrap_or(0);
            }
        }
        0
    }
}

/// The PackInfo section: where the packed extents live and how big they
/// are.
#[derive(Debug, Clone, Default)]
pub struct PackInfo {
    /// Offset of the first pack byte, relative to the end of the start
    /// header.
    pub pack_pos: u64,
    /// Size of each pack stream.
    pub pack_sizes: Vec<u64>,
    /// Optional CRC of each pack stream.
    pub pack_crcs: Vec<Option<u32>>,
}

impl PackInfo {
    /// Parses a PackInfo section (cursor past the section tag).
    pub(crate) fn parse(c: &mut HeaderCursor<'_>) -> Result<Self> {
        let pack_pos = c.read_number()?;
        let num_streams = c.read_number32()? as usize;

        c.wait_for_tag(property_id::SIZE)?;
        let mut pack_sizes = Vec::with_capacity(num_streams);
        for _ in 0..num_streams {
            pack_sizes.push(c.read_number()?);
        }

        let mut pack_crcs = vec![None; num_streams];
        loop {
            let tag = c.read_tag()?;
            if tag == property_id::END {
                break;
            }
            if tag == property_id::CRC {
                pack_crcs = c.read_hash_digests(num_streams)?;
                continue;
            }
            c.skip_sized()?;
        }

        Ok(Self {
            pack_pos,
            pack_sizes,
            pack_crcs,
        })
    }
}

/// Parses an UnpackInfo section into folders with unpack sizes and CRCs.
pub(crate) fn read_unpack_info(c: &mut HeaderCursor<'_>) -> Result<Vec<Folder>> {
    c.wait_for_tag(property_id::FOLDER)?;
    let num_folders = c.read_number32()? as usize;
    c.read_external_switch()?;

    let mut folders = Vec::with_capacity(num_folders);
    for _ in 0..num_folders {
        folders.push(Folder::parse(c)?);
    }

    c.wait_for_tag(property_id::CODERS_UNPACK_SIZE)?;
    for folder in &mut folders {
        let num_out = folder.num_out_streams_total() as usize;
        folder.unpack_sizes = Vec::with_capacity(num_out);
        for _ in 0..num_out {
            folder.unpack_sizes.push(c.read_number()?);
        }
    }

    loop {
        let tag = c.read_tag()?;
        if tag == property_id::END {
            return Ok(folders);
        }
        if tag == property_id::CRC {
            let digests = c.read_hash_digests(folders.len())?;
            for (folder, crc) in folders.iter_mut().zip(digests) {
                folder.unpack_crc = crc;
            }
            continue;
        }
        c.skip_sized()?;
    }
}

/// Per-substream sizes and digests produced by a SubStreamsInfo section.
#[derive(Debug, Clone, Default)]
pub struct SubStreams {
    /// Unpacked size of every substream, folder by folder.
    pub sizes: Vec<u64>,
    /// Optional CRC of every substream.
    pub digests: Vec<Option<u32>>,
}

impl SubStreams {
    /// Derives the defaults for archives without a SubStreamsInfo
    /// section: one substream per folder, with the folder's size and CRC.
    pub(crate) fn defaults(folders: &mut [Folder]) -> Self {
        let mut sizes = Vec::with_capacity(folders.len());
        let mut digests = Vec::with_capacity(folders.len());
        for folder in folders.iter_mut() {
            folder.num_unpack_streams = 1;
            sizes.push(folder.unpack_size());
            digests.push(folder.unpack_crc);
        }
        Self { sizes, digests }
    }

    /// Parses a SubStreamsInfo section (cursor past the section tag),
    /// updating `num_unpack_streams` on the folders as it goes.
    pub(crate) fn parse(c: &mut HeaderCursor<'_>, folders: &mut [Folder]) -> Result<Self> {
        for folder in folders.iter_mut() {
            folder.num_unpack_streams = 1;
        }
        let mut total: u64 = folders.len() as u64;

        let mut tag;
        loop {
            tag = c.read_tag()?;
            if tag == property_id::NUM_UNPACK_STREAM {
                total = 0;
                for folder in folders.iter_mut() {
                    folder.num_unpack_streams = c.read_number32()?;
                    total += folder.num_unpack_streams as u64;
                }
                continue;
            }
            if tag == property_id::CRC || tag == property_id::SIZE || tag == property_id::END {
                break;
            }
            c.skip_sized()?;
        }
        let total = usize::try_from(total).map_err(|_| Error::Mem("substream count"))?;

        let mut sizes = Vec::with_capacity(total);
        for folder in folders.iter() {
            // Folders with no substreams contribute nothing, even when
            // their declared unpack size is non-zero.
            let n = folder.num_unpack_streams;
            if n == 0 {
                continue;
            }
            let mut sum = 0u64;
            if tag == property_id::SIZE {
                for _ in 1..n {
                    let size = c.read_number()?;
                    sizes.push(size);
                    sum += size;
                }
            } else if n != 1 {
                return c.corrupt("substream sizes missing".into());
            }
            match folder.unpack_size().checked_sub(sum) {
                Some(last) => sizes.push(last),
                None => return c.corrupt("substream sizes exceed folder size".into()),
            }
        }
        if sizes.len() != total {
            return c.corrupt("substream size table incomplete".into());
        }
        if tag == property_id::SIZE {
            tag = c.read_tag()?;
        }

        let mut digests = vec![None; total];
        // Substreams that inherit a folder CRC are not stored again.
        let num_digests: u64 = folders
            .iter()
            .filter(|f| f.num_unpack_streams != 1 || f.unpack_crc.is_none())
            .map(|f| f.num_unpack_streams as u64)
            .sum();

        loop {
            if tag == property_id::CRC {
                let stored = c.read_hash_digests(num_digests as usize)?;
                let mut si = 0;
                let mut di = 0;
                for folder in folders.iter() {
                    if folder.num_unpack_streams == 1 && folder.unpack_crc.is_some() {
                        digests[si] = folder.unpack_crc;
                        si += 1;
                    } else {
                        for _ in 0..folder.num_unpack_streams {
                            digests[si] = stored[di];
                            si += 1;
                            di += 1;
                        }
                    }
                }
            } else if tag == property_id::END {
                return Ok(Self { sizes, digests });
            } else {
                c.skip_sized()?;
            }
            tag = c.read_tag()?;
        }
    }
}
