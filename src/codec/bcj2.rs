//! BCJ2 filter for x86 executables.
//!
//! BCJ2 splits filtered code across four streams:
//! - stream 0 (main): code bytes, emitted mostly verbatim
//! - stream 1 (call): absolute CALL targets, 4 bytes big-endian each
//! - stream 2 (jump): absolute JMP/Jcc targets, same layout
//! - stream 3 (control): range-coded flags, one per candidate branch
//!
//! The decoder copies main-stream bytes until a CALL/JMP/Jcc opcode,
//! then asks the control stream whether that instruction was converted.
//! Confirmed branches pull an absolute target from the call or jump
//! stream and re-encode it relative to the write position.
//!
//! The main stream is read from inside the output buffer itself (the
//! folder decoder places it at the tail), which satisfies the overlap
//! rule: the read cursor can never fall behind the write cursor.

use crate::codec::range::{INITIAL_PROB, RangeDecoder};
use crate::{Error, Result};

/// Probability slots: one per previous byte for E8, one for E9, one for
/// all Jcc forms.
const NUM_MODELS: usize = 256 + 2;

#[inline]
fn is_jcc(b0: u8, b1: u8) -> bool {
    b0 == 0x0F && (b1 & 0xF0) == 0x80
}

#[inline]
fn is_j(b0: u8, b1: u8) -> bool {
    (b1 & 0xFE) == 0xE8 || is_jcc(b0, b1)
}

/// Merges the four BCJ2 streams into `out`.
///
/// The main stream is `out[main_offset..]`; `call`, `jump` and `control`
/// are the remaining three inputs. Fails with [`Error::Data`] if any
/// stream runs short or the output cannot be filled exactly.
pub fn decode_in_place(
    out: &mut [u8],
    main_offset: usize,
    call: &[u8],
    jump: &[u8],
    control: &[u8],
) -> Result<()> {
    if out.is_empty() {
        return Ok(());
    }
    let mut probs = [INITIAL_PROB; NUM_MODELS];
    let mut rc = RangeDecoder::new(control)?;

    let size0 = out.len() - main_offset;
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;
    let mut call_pos = 0usize;
    let mut jump_pos = 0usize;
    let mut prev = 0u8;

    loop {
        // Copy main-stream bytes until the next branch candidate.
        let mut limit = (size0 - in_pos).min(out.len() - out_pos);
        let mut hit_branch = false;
        while limit != 0 {
            let b = out[main_offset + in_pos];
            out[out_pos] = b;
            out_pos += 1;
            if is_j(prev, b) {
                hit_branch = true;
                break;
            }
            in_pos += 1;
            prev = b;
            limit -= 1;
        }

        if !hit_branch || out_pos == out.len() {
            break;
        }

        let b = out[main_offset + in_pos];
        in_pos += 1;

        let model = match b {
            0xE8 => prev as usize,
            0xE9 => 256,
            _ => 257,
        };
        if rc.decode_bit(&mut probs[model])? == 0 {
            prev = b;
            continue;
        }

        // A converted branch: pull an absolute target and relativise it.
        let (stream, pos) = if b == 0xE8 {
            (call, &mut call_pos)
        } else {
            (jump, &mut jump_pos)
        };
        if stream.len() - *pos < 4 {
            return Err(Error::Data("BCJ2 target stream exhausted"));
        }
        let target = u32::from_be_bytes([
            stream[*pos],
            stream[*pos + 1],
            stream[*pos + 2],
            stream[*pos + 3],
        ]);
        *pos += 4;
        let dest = target.wrapping_sub(out_pos as u32 + 4);

        out[out_pos] = dest as u8;
        out_pos += 1;
        if out_pos == out.len() {
            break;
        }
        out[out_pos] = (dest >> 8) as u8;
        out_pos += 1;
        if out_pos == out.len() {
            break;
        }
        out[out_pos] = (dest >> 16) as u8;
        out_pos += 1;
        if out_pos == out.len() {
            break;
        }
        prev = (dest >> 24) as u8;
        out[out_pos] = prev;
        out_pos += 1;
    }

    if out_pos == out.len() {
        Ok(())
    } else {
        Err(Error::Data("BCJ2 output not filled"))
    }
}
