//! Signature scan and start-header parsing.

use log::debug;

use crate::source::{ByteSource, LOOK_BUF_SIZE, LookAheadReader};
use crate::{Error, Result, checksum};

use super::{SIGNATURE_HEADER_SIZE, SIGNATURE_SIZE, VERSION_MAJOR, is_signature};
use super::reader::{get_u32_le, get_u64_le};

/// How far into the source the signature is searched for (2 MiB).
///
/// Self-extracting archives put an executable stub in front of the
/// archive image; anything past this limit is not treated as an archive.
pub const SIGNATURE_SEARCH_LIMIT: u64 = 2 << 20;

/// The fixed 32-byte start header of a 7z archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartHeader {
    /// Absolute offset of the byte following the 32-byte start header.
    pub start_pos_after_header: u64,
    /// Offset of the next header, relative to `start_pos_after_header`.
    pub next_header_offset: u64,
    /// Size of the next header in bytes.
    pub next_header_size: u64,
    /// CRC-32 of the next header bytes.
    pub next_header_crc: u32,
}

/// Scans for the 7z signature and parses the start header behind it.
///
/// The reader is expected to be freshly positioned at offset 0. Returns
/// [`Error::NoArchive`] when no signature exists in the first 2 MiB,
/// [`Error::Unsupported`] for an unknown major version and [`Error::Crc`]
/// when the start header fails its own checksum.
pub fn read_start_header<S: ByteSource>(r: &mut LookAheadReader<S>) -> Result<StartHeader> {
    let sig_pos = find_signature(r)?.ok_or(Error::NoArchive)?;
    debug!("7z signature at offset {sig_pos:#x}");

    let mut buf = [0u8; SIGNATURE_HEADER_SIZE as usize];
    r.seek_to(sig_pos)?;
    r.read_all(&mut buf)?;

    if buf[6] != VERSION_MAJOR {
        return Err(Error::Unsupported("archive major version"));
    }
    // buf[7] is the minor version; producers vary it freely.

    let start_header_crc = get_u32_le(&buf, 8);
    checksum::verify("start header", start_header_crc, &buf[12..32])?;

    let header = StartHeader {
        start_pos_after_header: sig_pos + SIGNATURE_HEADER_SIZE,
        next_header_offset: get_u64_le(&buf, 12),
        next_header_size: get_u64_le(&buf, 20),
        next_header_crc: get_u32_le(&buf, 28),
    };
    debug!(
        "next header: offset {:#x}, size {}",
        header.next_header_offset, header.next_header_size
    );
    Ok(header)
}

/// Finds the absolute offset of the 7z signature, searching the first
/// [`SIGNATURE_SEARCH_LIMIT`] bytes.
fn find_signature<S: ByteSource>(r: &mut LookAheadReader<S>) -> Result<Option<u64>> {
    let mut base = 0u64;
    while base < SIGNATURE_SEARCH_LIMIT {
        let window = r.look(LOOK_BUF_SIZE);
        if window.len() < SIGNATURE_HEADER_SIZE as usize {
            break;
        }
        // Keep a 31-byte overlap so a signature straddling windows, and
        // the start header behind it, are seen whole on the next pass.
        let scan = window.len() - (SIGNATURE_HEADER_SIZE as usize - 1);
        for i in 0..scan {
            if is_signature(&window[i..i + SIGNATURE_SIZE]) {
                return Ok(Some(base + i as u64));
            }
        }
        r.skip(scan);
        base += scan as u64;
    }
    Ok(None)
}
