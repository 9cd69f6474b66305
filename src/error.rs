//! Error types for 7z archive reading.
//!
//! Every fallible operation in this crate returns [`Result<T>`], an alias
//! for `std::result::Result<T, Error>`. The variant split follows one
//! rule: a violation of the 7z grammar is [`Error::Data`] (or
//! [`Error::Archive`] when detected while parsing the header), while a
//! grammatically valid construct this reader does not implement is
//! [`Error::Unsupported`] or [`Error::UnsupportedMethod`].

/// The error type for all archive operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The compressed data violates the format it claims to be in.
    #[error("data error: {0}")]
    Data(&'static str),

    /// A declared size does not fit in addressable memory.
    #[error("size does not fit in memory: {0}")]
    Mem(&'static str),

    /// A CRC-32 check failed.
    ///
    /// The decoded buffer is left intact when this is returned from an
    /// extraction, so callers may still inspect the bytes.
    #[error("CRC mismatch in {what}: expected {expected:#010x}, got {actual:#010x}")]
    Crc {
        /// What was being checked (start header, folder, file, ...).
        what: &'static str,
        /// The CRC stored in the archive.
        expected: u32,
        /// The CRC of the bytes actually read.
        actual: u32,
    },

    /// A valid 7z construct that this reader does not implement.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// A coder method this reader does not implement.
    #[error("unsupported method {method_id:#x}")]
    UnsupportedMethod {
        /// The 64-bit method identifier from the folder definition.
        method_id: u64,
    },

    /// An argument violated a documented precondition.
    #[error("invalid parameter: {0}")]
    Param(&'static str),

    /// The source ended before a decoder got all the bytes it was promised.
    #[error("unexpected end of input")]
    InputEof,

    /// A seek or read past the end of the byte source.
    #[error("read past end of source")]
    Read,

    /// An internal consistency check failed.
    #[error("internal failure: {0}")]
    Fail(&'static str),

    /// The file name table is malformed.
    #[error("malformed file name table")]
    BadFilename,

    /// The archive header is structurally corrupt.
    ///
    /// `offset` is relative to the start of the (possibly decoded) header
    /// block being parsed.
    #[error("corrupt header at offset {offset:#x}: {reason}")]
    Archive {
        /// Byte offset within the header where the problem was detected.
        offset: u64,
        /// What was wrong.
        reason: String,
    },

    /// No 7z signature was found in the source.
    #[error("no 7z signature found")]
    NoArchive,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
