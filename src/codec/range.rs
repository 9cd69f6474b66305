//! Range coder primitives shared by the LZMA and BCJ2 decoders.
//!
//! Probabilities are 11-bit adaptive models (scale 2048, initial 1024)
//! updated by `p += (2048 - p) >> 5` after a 0-bit and `p -= p >> 5`
//! after a 1-bit. The coder state is a `(range, code)` pair; whenever
//! `range` drops below 2^24 one more input byte is shifted into `code`.

use crate::{Error, Result};

/// Bits in a probability model.
pub const MODEL_TOTAL_BITS: u32 = 11;
/// Probability scale (2048).
pub const BIT_MODEL_TOTAL: u32 = 1 << MODEL_TOTAL_BITS;
/// Shift used by probability updates.
pub const MOVE_BITS: u32 = 5;
/// Normalisation threshold (2^24).
pub const TOP_VALUE: u32 = 1 << 24;
/// Initial probability (50%).
pub const INITIAL_PROB: u16 = (BIT_MODEL_TOTAL / 2) as u16;
/// Bytes consumed by coder initialisation.
pub const INIT_BYTES: usize = 5;

/// Resets every model in `probs` to 50%.
pub fn init_probs(probs: &mut [u16]) {
    probs.fill(INITIAL_PROB);
}

/// A slice-backed range decoder, used for BCJ2's control stream.
///
/// The LZMA decoder keeps its own coder state inline because its input
/// arrives in windows; this standalone form serves decoders whose whole
/// input is in memory.
#[derive(Debug)]
pub struct RangeDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
    range: u32,
    code: u32,
}

impl<'a> RangeDecoder<'a> {
    /// Initialises the decoder, consuming the first 5 input bytes.
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < INIT_BYTES {
            return Err(Error::Data("range coder input too short"));
        }
        let mut code = 0u32;
        for &b in &buf[..INIT_BYTES] {
            code = (code << 8) | b as u32;
        }
        Ok(Self {
            buf,
            pos: INIT_BYTES,
            range: u32::MAX,
            code,
        })
    }

    /// Decodes one bit against the adaptive model `prob`.
    pub fn decode_bit(&mut self, prob: &mut u16) -> Result<u32> {
        let bound = (self.range >> MODEL_TOTAL_BITS) * *prob as u32;
        let bit = if self.code < bound {
            self.range = bound;
            *prob += ((BIT_MODEL_TOTAL - *prob as u32) >> MOVE_BITS) as u16;
            0
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> MOVE_BITS;
            1
        };
        if self.range < TOP_VALUE {
            if self.pos == self.buf.len() {
                return Err(Error::Data("range coder input exhausted"));
            }
            self.range <<= 8;
            self.code = (self.code << 8) | self.buf[self.pos] as u32;
            self.pos += 1;
        }
        Ok(bit)
    }
}
