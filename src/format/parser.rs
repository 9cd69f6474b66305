//! Header dispatch: streams info, the main header and the encoded
//! header wrapper.

use log::debug;

use crate::source::{ByteSource, LookAheadReader};
use crate::{Error, Result, checksum, codec};

use super::files::FilesInfo;
use super::property_id;
use super::reader::HeaderCursor;
use super::streams::{Folder, PackInfo, SubStreams, read_unpack_info};

/// Everything a StreamsInfo section describes: pack extents, folders and
/// the per-substream size/digest tables.
#[derive(Debug, Clone, Default)]
pub struct StreamsInfo {
    /// Offset of the first pack byte, relative to the end of the start
    /// header.
    pub data_offset: u64,
    /// Size of each pack stream.
    pub pack_sizes: Vec<u64>,
    /// Optional CRC of each pack stream.
    pub pack_crcs: Vec<Option<u32>>,
    /// Folder pipeline definitions.
    pub folders: Vec<Folder>,
    /// Unpacked size of each substream.
    pub substream_sizes: Vec<u64>,
    /// Optional CRC of each substream.
    pub substream_crcs: Vec<Option<u32>>,
}

/// Parses a StreamsInfo section (cursor past the section tag).
///
/// Unknown tags at this level are a hard error; only FilesInfo
/// sub-properties are skippable.
pub fn read_streams_info(c: &mut HeaderCursor<'_>) -> Result<StreamsInfo> {
    let mut info = StreamsInfo::default();
    let mut substreams: Option<SubStreams> = None;

    loop {
        let tag = c.read_tag()?;
        match tag {
            property_id::END => break,
            property_id::PACK_INFO => {
                let pack = PackInfo::parse(c)?;
                info.data_offset = pack.pack_pos;
                info.pack_sizes = pack.pack_sizes;
                info.pack_crcs = pack.pack_crcs;
            }
            property_id::UNPACK_INFO => {
                info.folders = read_unpack_info(c)?;
            }
            property_id::SUBSTREAMS_INFO => {
                substreams = Some(SubStreams::parse(c, &mut info.folders)?);
            }
            _ => return Err(Error::Unsupported("unknown streams info section")),
        }
    }

    let substreams =
        substreams.unwrap_or_else(|| SubStreams::defaults(&mut info.folders));
    info.substream_sizes = substreams.sizes;
    info.substream_crcs = substreams.digests;
    Ok(info)
}

/// A fully parsed archive header.
#[derive(Debug, Clone, Default)]
pub struct ArchiveHeader {
    /// Main streams info, absent for empty archives.
    pub streams: Option<StreamsInfo>,
    /// File metadata, absent for archives without a file table.
    pub files: Option<FilesInfo>,
}

/// Parses the main header (cursor past the Header tag).
pub fn read_header(c: &mut HeaderCursor<'_>) -> Result<ArchiveHeader> {
    let mut header = ArchiveHeader::default();

    let mut tag = c.read_tag()?;
    if tag == property_id::ARCHIVE_PROPERTIES {
        // Nothing in this reader consumes archive properties.
        loop {
            let prop = c.read_tag()?;
            if prop == property_id::END {
                break;
            }
            c.skip_sized()?;
        }
        tag = c.read_tag()?;
    }

    if tag == property_id::MAIN_STREAMS_INFO {
        header.streams = Some(read_streams_info(c)?);
        tag = c.read_tag()?;
    }

    if tag == property_id::END {
        return Ok(header);
    }
    if tag != property_id::FILES_INFO {
        return c.corrupt(format!("unexpected tag {tag:#x} in header"));
    }

    let (sizes, crcs) = match &header.streams {
        Some(s) => (s.substream_sizes.as_slice(), s.substream_crcs.as_slice()),
        None => (&[] as &[u64], &[] as &[Option<u32>]),
    };
    header.files = Some(FilesInfo::parse(c, sizes, crcs)?);
    Ok(header)
}

/// Decodes the single folder an encoded-header StreamsInfo describes,
/// returning the real header bytes.
///
/// `base_offset` is the absolute position pack offsets are relative to
/// (the byte after the start header).
pub fn read_and_decode_packed_header<S: ByteSource>(
    c: &mut HeaderCursor<'_>,
    input: &mut LookAheadReader<S>,
    base_offset: u64,
) -> Result<Vec<u8>> {
    let info = read_streams_info(c)?;
    if info.folders.len() != 1 {
        return Err(Error::Archive {
            offset: c.position(),
            reason: "encoded header must hold exactly one folder".into(),
        });
    }
    let folder = &info.folders[0];
    let unpack_size = usize::try_from(folder.unpack_size())
        .map_err(|_| Error::Mem("encoded header size"))?;
    let data_start = base_offset + info.data_offset;
    debug!("decoding packed header: {unpack_size} bytes at {data_start:#x}");

    input.seek_to(data_start)?;
    let mut out = vec![0u8; unpack_size];
    codec::decode_folder(folder, &info.pack_sizes, input, data_start, &mut out)?;

    if let Some(crc) = folder.unpack_crc {
        checksum::verify("encoded header", crc, &out)?;
    }
    Ok(out)
}
