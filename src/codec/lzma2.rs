//! LZMA2 framing: a control-byte state machine over the LZMA core.
//!
//! Each chunk starts with a control byte: `0x00` ends the stream,
//! `0x01`/`0x02` introduce uncompressed chunks (with/without dictionary
//! reset) and `0x80..=0xFF` LZMA chunks whose bits 5-6 select the reset
//! mode and bits 0-4 the top of the unpack size. Sizes are stored minus
//! one; reset modes 2 and 3 carry a fresh properties byte.

use std::cmp;

use crate::codec::lzma::{FinishMode, LzmaDecoder, LzmaProps, LzmaStatus};
use crate::source::{ByteSource, LOOK_BUF_SIZE, LookAheadReader};
use crate::{Error, Result};

/// `lc + lp` limit imposed by LZMA2.
const LCLP_MAX: u32 = 4;

/// Derives the dictionary size from the out-of-band LZMA2 prop byte.
pub fn dic_size_from_prop(prop: u8) -> Result<u32> {
    if prop > 40 {
        return Err(Error::Unsupported("LZMA2 dictionary prop byte"));
    }
    if prop == 40 {
        return Ok(u32::MAX);
    }
    Ok((2 | (prop as u32 & 1)) << (prop / 2 + 11))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Control,
    Unpack0,
    Unpack1,
    Pack0,
    Pack1,
    Prop,
    Data,
    DataCont,
    Finished,
}

/// The LZMA2 chunk decoder.
pub struct Lzma2Decoder {
    dec: LzmaDecoder,
    state: State,
    control: u8,
    unpack_size: u32,
    pack_size: u32,
    need_init_dic: bool,
    need_init_state: bool,
    need_init_prop: bool,
}

impl Lzma2Decoder {
    /// Creates a decoder from the one-byte LZMA2 properties.
    pub fn new(prop: u8) -> Result<Self> {
        let dic_size = dic_size_from_prop(prop)?;
        // Until the first chunk supplies real literal settings, size the
        // probability table for the lc+lp maximum so it never reallocates.
        let mut props_blob = [LCLP_MAX as u8, 0, 0, 0, 0];
        props_blob[1..].copy_from_slice(&dic_size.to_le_bytes());
        let props = LzmaProps::decode(&props_blob)?;
        let mut dec = Self {
            dec: LzmaDecoder::new(props),
            state: State::Control,
            control: 0,
            unpack_size: 0,
            pack_size: 0,
            need_init_dic: true,
            need_init_state: true,
            need_init_prop: true,
        };
        dec.reset();
        Ok(dec)
    }

    /// Resets for a fresh stream.
    pub fn reset(&mut self) {
        self.state = State::Control;
        self.need_init_dic = true;
        self.need_init_state = true;
        self.need_init_prop = true;
        self.dec.reset();
    }

    /// Current write position in the dictionary.
    pub fn dic_pos(&self) -> usize {
        self.dec.dic_pos
    }

    fn is_uncompressed(&self) -> bool {
        self.control & 0x80 == 0
    }

    fn lzma_mode(&self) -> u8 {
        (self.control >> 5) & 3
    }

    /// Consumes one header byte of the chunk state machine.
    fn update_state(&mut self, b: u8) -> Result<State> {
        Ok(match self.state {
            State::Control => {
                self.control = b;
                if b == 0 {
                    return Ok(State::Finished);
                }
                if self.is_uncompressed() {
                    if b & 0x7F > 2 {
                        return Err(Error::Data("bad LZMA2 control byte"));
                    }
                    self.unpack_size = 0;
                } else {
                    self.unpack_size = ((b & 0x1F) as u32) << 16;
                }
                State::Unpack0
            }
            State::Unpack0 => {
                self.unpack_size |= (b as u32) << 8;
                State::Unpack1
            }
            State::Unpack1 => {
                self.unpack_size |= b as u32;
                self.unpack_size += 1;
                if self.is_uncompressed() {
                    State::Data
                } else {
                    State::Pack0
                }
            }
            State::Pack0 => {
                self.pack_size = (b as u32) << 8;
                State::Pack1
            }
            State::Pack1 => {
                self.pack_size |= b as u32;
                self.pack_size += 1;
                if self.lzma_mode() >= 2 {
                    State::Prop
                } else if self.need_init_prop {
                    return Err(Error::Data("LZMA2 chunk without initial properties"));
                } else {
                    State::Data
                }
            }
            State::Prop => {
                if b >= 9 * 5 * 5 {
                    return Err(Error::Data("bad LZMA2 properties byte"));
                }
                let mut d = b as u32;
                let lc = d % 9;
                d /= 9;
                let pb = d / 5;
                let lp = d % 5;
                if lc + lp > LCLP_MAX {
                    return Err(Error::Data("LZMA2 lc+lp out of range"));
                }
                self.dec.set_literal_props(lc, lp, pb);
                self.need_init_prop = false;
                State::Data
            }
            State::Data | State::DataCont | State::Finished => {
                return Err(Error::Fail("LZMA2 state machine out of step"));
            }
        })
    }

    /// Decodes into `dic[..dic_limit]`, consuming bytes from `src`.
    ///
    /// Mirrors [`LzmaDecoder::decode_to_dic`], with chunk headers eaten
    /// byte by byte between payloads.
    pub fn decode_to_dic(
        &mut self,
        dic: &mut [u8],
        dic_limit: usize,
        src: &[u8],
        src_len: &mut usize,
        finish: FinishMode,
    ) -> Result<LzmaStatus> {
        let in_size = src.len();
        *src_len = 0;

        while self.state != State::Finished {
            let dic_pos = self.dec.dic_pos;

            if dic_pos == dic_limit && finish == FinishMode::Any {
                return Ok(LzmaStatus::NotFinished);
            }

            if self.state != State::Data && self.state != State::DataCont {
                if *src_len == in_size {
                    return Ok(LzmaStatus::NeedsMoreInput);
                }
                let b = src[*src_len];
                *src_len += 1;
                self.state = self.update_state(b)?;
                continue;
            }

            let mut dest_size = dic_limit - dic_pos;
            let mut src_size = in_size - *src_len;
            let mut chunk_finish = FinishMode::Any;
            if self.unpack_size as usize <= dest_size {
                dest_size = self.unpack_size as usize;
                chunk_finish = FinishMode::End;
            }

            if self.is_uncompressed() {
                if *src_len == in_size {
                    return Ok(LzmaStatus::NeedsMoreInput);
                }
                if self.state == State::Data {
                    let init_dic = self.control == 0x01;
                    if init_dic {
                        self.need_init_prop = true;
                        self.need_init_state = true;
                    } else if self.need_init_dic {
                        return Err(Error::Data("LZMA2 chunk needs dictionary reset"));
                    }
                    self.need_init_dic = false;
                    self.dec.init_dic_and_state(init_dic, false);
                }
                src_size = cmp::min(src_size, dest_size);
                if src_size == 0 {
                    return Err(Error::Data("empty uncompressed LZMA2 chunk"));
                }
                self.dec
                    .append_uncompressed(dic, &src[*src_len..*src_len + src_size]);
                *src_len += src_size;
                self.unpack_size -= src_size as u32;
                self.state = if self.unpack_size == 0 {
                    State::Control
                } else {
                    State::DataCont
                };
            } else {
                if self.state == State::Data {
                    let mode = self.lzma_mode();
                    let init_dic = mode == 3;
                    let init_state = mode > 0;
                    if (!init_dic && self.need_init_dic) || (!init_state && self.need_init_state)
                    {
                        return Err(Error::Data("LZMA2 chunk skips required reset"));
                    }
                    self.dec.init_dic_and_state(init_dic, init_state);
                    self.need_init_dic = false;
                    self.need_init_state = false;
                    self.state = State::DataCont;
                }
                src_size = cmp::min(src_size, self.pack_size as usize);

                let mut chunk_used = src_size;
                let status = self.dec.decode_to_dic(
                    dic,
                    dic_pos + dest_size,
                    &src[*src_len..*src_len + src_size],
                    &mut chunk_used,
                    chunk_finish,
                )?;
                *src_len += chunk_used;
                self.pack_size -= chunk_used as u32;
                let produced = self.dec.dic_pos - dic_pos;
                self.unpack_size -= produced as u32;

                if status == LzmaStatus::NeedsMoreInput {
                    return Ok(status);
                }
                if chunk_used == 0 && produced == 0 {
                    if status != LzmaStatus::MaybeFinishedWithoutMark
                        || self.unpack_size != 0
                        || self.pack_size != 0
                    {
                        return Err(Error::Data("LZMA2 chunk ended badly"));
                    }
                    self.state = State::Control;
                }
            }
        }
        Ok(LzmaStatus::FinishedWithMark)
    }
}

/// Decodes one LZMA2-coded pack stream of exactly `in_size` bytes into
/// `out`, streaming the input through the look-ahead window.
pub fn decode_stream<S: ByteSource>(
    props: &[u8],
    mut in_size: u64,
    input: &mut LookAheadReader<S>,
    out: &mut [u8],
) -> Result<()> {
    if props.len() != 1 {
        return Err(Error::Data("LZMA2 properties must be one byte"));
    }
    let mut dec = Lzma2Decoder::new(props[0])?;
    let out_size = out.len();

    loop {
        let want = cmp::min(in_size, LOOK_BUF_SIZE as u64) as usize;
        let window = input.look(want);
        let avail = cmp::min(window.len() as u64, in_size) as usize;

        let dic_pos = dec.dic_pos();
        let mut src_len = avail;
        let status =
            dec.decode_to_dic(out, out_size, &window[..avail], &mut src_len, FinishMode::End)?;
        in_size -= src_len as u64;

        if dec.dic_pos() == out_size || (src_len == 0 && dic_pos == dec.dic_pos()) {
            if in_size != 0 || status != LzmaStatus::FinishedWithMark {
                return Err(Error::Data("LZMA2 stream ended badly"));
            }
            return Ok(());
        }
        input.skip(src_len);
    }
}
