//! Decoders and the folder pipeline that drives them.
//!
//! A folder is decoded straight into the caller's output buffer. Only
//! three coder topologies exist in the supported subset:
//!
//! 1. a single main coder (Copy, LZMA or LZMA2);
//! 2. a main coder post-filtered in place by BCJ or ARM;
//! 3. three main coders feeding BCJ2, with the main code stream decoded
//!    to the tail of the output buffer and two temporaries for the
//!    call/jump target streams.
//!
//! Anything else is rejected as unsupported before any byte is decoded.

pub mod bcj2;
pub mod filters;
pub mod lzma;
pub mod lzma2;
pub mod range;

use log::{debug, trace};

use crate::format::method_id;
use crate::format::streams::{Coder, Folder};
use crate::source::{ByteSource, LookAheadReader};
use crate::{Error, Result};

fn is_main_method(m: u64) -> bool {
    matches!(m, method_id::COPY | method_id::LZMA | method_id::LZMA2)
}

fn is_supported_coder(c: &Coder) -> bool {
    c.num_in_streams == 1
        && c.num_out_streams == 1
        && c.method_id <= u32::MAX as u64
        && is_main_method(c.method_id)
}

fn is_bcj2(c: &Coder) -> bool {
    c.method_id == method_id::BCJ2 && c.num_in_streams == 4 && c.num_out_streams == 1
}

/// Checks that a folder matches one of the three supported topologies.
pub fn check_supported_folder(f: &Folder) -> Result<()> {
    if f.coders.is_empty() || f.coders.len() > 4 {
        return Err(Error::Unsupported("folder coder count"));
    }
    if !is_supported_coder(&f.coders[0]) {
        return Err(Error::UnsupportedMethod {
            method_id: f.coders[0].method_id,
        });
    }
    match f.coders.len() {
        1 => {
            if f.packed_streams != [0] || !f.bind_pairs.is_empty() {
                return Err(Error::Unsupported("single-coder folder wiring"));
            }
            Ok(())
        }
        2 => {
            let filter = &f.coders[1];
            if filter.method_id > u32::MAX as u64
                || filter.num_in_streams != 1
                || filter.num_out_streams != 1
                || f.packed_streams != [0]
                || f.bind_pairs.len() != 1
                || f.bind_pairs[0].in_index != 1
                || f.bind_pairs[0].out_index != 0
            {
                return Err(Error::Unsupported("filter folder wiring"));
            }
            match filter.method_id {
                method_id::BCJ | method_id::ARM => Ok(()),
                _ => Err(Error::UnsupportedMethod {
                    method_id: filter.method_id,
                }),
            }
        }
        4 => {
            if !is_supported_coder(&f.coders[1])
                || !is_supported_coder(&f.coders[2])
                || !is_bcj2(&f.coders[3])
            {
                return Err(Error::Unsupported("BCJ2 folder coders"));
            }
            let pairs_ok = f.bind_pairs.len() == 3
                && (f.bind_pairs[0].in_index, f.bind_pairs[0].out_index) == (5, 0)
                && (f.bind_pairs[1].in_index, f.bind_pairs[1].out_index) == (4, 1)
                && (f.bind_pairs[2].in_index, f.bind_pairs[2].out_index) == (3, 2);
            if f.packed_streams != [2, 6, 1, 0] || !pairs_ok {
                return Err(Error::Unsupported("BCJ2 folder wiring"));
            }
            Ok(())
        }
        _ => Err(Error::Unsupported("folder coder count")),
    }
}

fn sum(values: &[u64], count: usize) -> u64 {
    values[..count].iter().sum()
}

/// Decodes a whole folder into `out`.
///
/// `pack_sizes` are the folder's pack-stream sizes in pack order and
/// `start_pos` the absolute position of its first pack byte. The length
/// of `out` must equal the folder's final unpack size.
pub fn decode_folder<S: ByteSource>(
    folder: &Folder,
    pack_sizes: &[u64],
    input: &mut LookAheadReader<S>,
    start_pos: u64,
    out: &mut [u8],
) -> Result<()> {
    check_supported_folder(folder)?;
    if pack_sizes.len() < folder.packed_streams.len() {
        return Err(Error::Fail("pack size table shorter than folder wiring"));
    }

    // BCJ2 temporaries: [0] call targets, [1] jump targets, plus the
    // control stream read when the BCJ2 coder itself runs.
    let mut temp: [Vec<u8>; 2] = [Vec::new(), Vec::new()];
    let mut tail_offset = 0usize;

    enum Target {
        Whole,
        Temp(usize),
        Tail,
    }

    for (ci, coder) in folder.coders.iter().enumerate() {
        if is_main_method(coder.method_id) {
            let mut si = 0usize;
            let mut target = Target::Whole;
            if folder.coders.len() == 4 {
                let unpack = folder.unpack_sizes[ci];
                si = [3, 2, 0][ci];
                if ci < 2 {
                    let size = usize::try_from(unpack)
                        .map_err(|_| Error::Mem("BCJ2 stream size"))?;
                    temp[1 - ci] = vec![0; size];
                    target = Target::Temp(1 - ci);
                } else {
                    if unpack > out.len() as u64 {
                        return Err(Error::Param("BCJ2 main stream larger than output"));
                    }
                    tail_offset = out.len() - unpack as usize;
                    target = Target::Tail;
                }
            }
            let offset = sum(pack_sizes, si);
            let in_size = pack_sizes[si];
            trace!("seek to pack stream {si} at {:#x}", start_pos + offset);
            input.seek_to(start_pos + offset)?;

            let out_buf: &mut [u8] = match target {
                Target::Whole => &mut out[..],
                Target::Temp(i) => &mut temp[i],
                Target::Tail => &mut out[tail_offset..],
            };
            match coder.method_id {
                method_id::COPY => {
                    debug!("coder {ci}: copy, {in_size} bytes");
                    if in_size != out_buf.len() as u64 {
                        return Err(Error::Data("copy coder size mismatch"));
                    }
                    input.read_all(out_buf)?;
                }
                method_id::LZMA => {
                    debug!("coder {ci}: LZMA, {in_size} -> {} bytes", out_buf.len());
                    lzma::decode_stream(&coder.props, in_size, input, out_buf)?;
                }
                method_id::LZMA2 => {
                    debug!("coder {ci}: LZMA2, {in_size} -> {} bytes", out_buf.len());
                    lzma2::decode_stream(&coder.props, in_size, input, out_buf)?;
                }
                _ => {
                    return Err(Error::UnsupportedMethod {
                        method_id: coder.method_id,
                    });
                }
            }
        } else if coder.method_id == method_id::BCJ2 {
            if ci != 3 {
                return Err(Error::Unsupported("BCJ2 coder position"));
            }
            let offset = sum(pack_sizes, 1);
            let control_size = usize::try_from(pack_sizes[1])
                .map_err(|_| Error::Mem("BCJ2 control stream size"))?;
            debug!("coder {ci}: BCJ2 merge, control {control_size} bytes");
            input.seek_to(start_pos + offset)?;
            let mut control = vec![0u8; control_size];
            input.read_all(&mut control)?;
            bcj2::decode_in_place(out, tail_offset, &temp[0], &temp[1], &control)?;
        } else {
            if ci != 1 {
                return Err(Error::Unsupported("filter coder position"));
            }
            match coder.method_id {
                method_id::BCJ => {
                    debug!("coder {ci}: BCJ filter over {} bytes", out.len());
                    let mut state = 0u32;
                    filters::x86_convert(out, 0, &mut state, false);
                }
                method_id::ARM => {
                    debug!("coder {ci}: ARM filter over {} bytes", out.len());
                    filters::arm_convert(out, 0, false);
                }
                _ => {
                    return Err(Error::UnsupportedMethod {
                        method_id: coder.method_id,
                    });
                }
            }
        }
    }
    Ok(())
}
