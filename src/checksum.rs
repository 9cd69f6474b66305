//! CRC-32 helpers.
//!
//! 7z uses the IEEE reflected CRC-32 (polynomial 0xEDB88320, all-ones
//! initial value, final inversion) for the start header, the main header,
//! decoded folders and individual files. `crc32fast` implements exactly
//! this variant.

use crate::{Error, Result};

/// Computes the CRC-32 of `data`.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Checks `data` against an expected CRC, naming the checked object in
/// the error.
pub fn verify(what: &'static str, expected: u32, data: &[u8]) -> Result<()> {
    let actual = crc32(data);
    if actual != expected {
        return Err(Error::Crc {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
