//! 7z archive format constants and low-level parsing.
//!
//! Magic numbers, property IDs and method IDs defined by the 7z
//! container, plus the cursor-based header parser built on them.

pub mod files;
pub mod header;
pub mod parser;
pub mod reader;
pub mod streams;

/// Size of the signature header in bytes.
///
/// The signature header contains:
/// - 6 bytes: signature
/// - 2 bytes: version (major, minor)
/// - 4 bytes: start header CRC
/// - 8 bytes: next header offset
/// - 8 bytes: next header size
/// - 4 bytes: next header CRC
pub const SIGNATURE_HEADER_SIZE: u64 = 32;

/// Tail of the 7z signature: everything after the leading `'7'`.
///
/// The first byte is matched separately in [`is_signature`] so the full
/// six-byte magic never appears in read-only data; an SFX stub scanning
/// for the magic must not find its own embedded copy before the archive.
pub const SIGNATURE_TAIL: [u8; 5] = [0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// Number of bytes in the full signature.
pub const SIGNATURE_SIZE: usize = 6;

/// Archive version - major. The only major version that exists.
pub const VERSION_MAJOR: u8 = 0;

/// Returns true if `b` starts with the 7z signature.
///
/// `b` must be at least [`SIGNATURE_SIZE`] bytes long.
#[inline]
pub fn is_signature(b: &[u8]) -> bool {
    b[0] == b'7' && b[1..SIGNATURE_SIZE] == SIGNATURE_TAIL
}

/// Property IDs used in 7z archive headers.
pub mod property_id {
    /// End of section marker.
    pub const END: u64 = 0x00;
    /// Header marker.
    pub const HEADER: u64 = 0x01;
    /// Archive properties.
    pub const ARCHIVE_PROPERTIES: u64 = 0x02;
    /// Additional streams info.
    pub const ADDITIONAL_STREAMS_INFO: u64 = 0x03;
    /// Main streams info.
    pub const MAIN_STREAMS_INFO: u64 = 0x04;
    /// Files info.
    pub const FILES_INFO: u64 = 0x05;
    /// Pack info.
    pub const PACK_INFO: u64 = 0x06;
    /// Unpack info.
    pub const UNPACK_INFO: u64 = 0x07;
    /// Substreams info.
    pub const SUBSTREAMS_INFO: u64 = 0x08;
    /// Size info.
    pub const SIZE: u64 = 0x09;
    /// CRC info.
    pub const CRC: u64 = 0x0A;
    /// Folder info.
    pub const FOLDER: u64 = 0x0B;
    /// Coders unpack size.
    pub const CODERS_UNPACK_SIZE: u64 = 0x0C;
    /// Number of unpack streams in folders.
    pub const NUM_UNPACK_STREAM: u64 = 0x0D;
    /// Empty stream indicator.
    pub const EMPTY_STREAM: u64 = 0x0E;
    /// Empty file indicator.
    pub const EMPTY_FILE: u64 = 0x0F;
    /// Anti-file indicator.
    pub const ANTI: u64 = 0x10;
    /// File names.
    pub const NAME: u64 = 0x11;
    /// Creation time.
    pub const CTIME: u64 = 0x12;
    /// Access time.
    pub const ATIME: u64 = 0x13;
    /// Modification time.
    pub const MTIME: u64 = 0x14;
    /// Windows file attributes.
    pub const WIN_ATTRIBUTES: u64 = 0x15;
    /// Comment.
    pub const COMMENT: u64 = 0x16;
    /// Encoded header.
    pub const ENCODED_HEADER: u64 = 0x17;
    /// Start position.
    pub const START_POS: u64 = 0x18;
    /// Dummy marker.
    pub const DUMMY: u64 = 0x19;
}

/// Compression method IDs, packed big-endian from the header id bytes.
pub mod method_id {
    /// Copy (no compression).
    pub const COPY: u64 = 0x00;
    /// LZMA2.
    pub const LZMA2: u64 = 0x21;
    /// LZMA.
    pub const LZMA: u64 = 0x03_01_01;
    /// BCJ (x86) branch filter.
    pub const BCJ: u64 = 0x03_03_01_03;
    /// BCJ2 four-stream x86 filter.
    pub const BCJ2: u64 = 0x03_03_01_1B;
    /// PowerPC branch filter (unsupported).
    pub const PPC: u64 = 0x03_03_02_05;
    /// ARM branch filter.
    pub const ARM: u64 = 0x03_03_05_01;
    /// ARM Thumb branch filter (unsupported).
    pub const ARMT: u64 = 0x03_03_07_01;
    /// SPARC branch filter (unsupported).
    pub const SPARC: u64 = 0x03_03_08_05;
}

/// Windows file attribute bits carried in FilesInfo.
pub mod attributes {
    /// Read-only file.
    pub const READONLY: u32 = 0x01;
    /// Directory.
    pub const DIRECTORY: u32 = 0x10;
    /// Symbolic link (reparse point).
    pub const REPARSE_POINT: u32 = 0x400;
    /// Unix mode bits are stored in the high 16 bits when set.
    pub const UNIX_EXTENSION: u32 = 0x8000;
}
