//! Shared test support: an in-memory archive builder plus the minimal
//! encoders needed to produce real LZMA and BCJ2 streams for the reader
//! to chew on.
#![allow(dead_code)]

use zevenz::checksum::crc32;
use zevenz::format::reader::write_number;

// ---------------------------------------------------------------------
// Range encoder
// ---------------------------------------------------------------------

const BIT_MODEL_TOTAL: u32 = 1 << 11;
const MOVE_BITS: u32 = 5;
const TOP_VALUE: u32 = 1 << 24;
pub const INITIAL_PROB: u16 = (BIT_MODEL_TOTAL / 2) as u16;

/// The carry-tracking LZMA range encoder.
pub struct RangeEncoder {
    low: u64,
    range: u32,
    cache: u8,
    cache_size: u32,
    out: Vec<u8>,
}

impl RangeEncoder {
    pub fn new() -> Self {
        Self {
            low: 0,
            range: u32::MAX,
            cache: 0,
            cache_size: 0,
            out: Vec::new(),
        }
    }

    pub fn encode_bit(&mut self, prob: &mut u16, bit: bool) {
        let p = *prob as u32;
        let bound = (self.range >> 11) * p;
        if bit {
            self.low += bound as u64;
            self.range -= bound;
            *prob -= *prob >> MOVE_BITS;
        } else {
            self.range = bound;
            *prob += ((BIT_MODEL_TOTAL - p) >> MOVE_BITS) as u16;
        }
        while self.range < TOP_VALUE {
            self.shift_low();
            self.range <<= 8;
        }
    }

    fn shift_low(&mut self) {
        let overflow = (self.low >> 32) as u8;
        let low32 = self.low as u32;
        if low32 < 0xFF00_0000 || overflow != 0 {
            self.out.push(self.cache.wrapping_add(overflow));
            for _ in 0..self.cache_size {
                self.out.push(0xFFu8.wrapping_add(overflow));
            }
            self.cache = (low32 >> 24) as u8;
            self.cache_size = 0;
        } else {
            self.cache_size += 1;
        }
        self.low = (low32.wrapping_shl(8)) as u64;
    }

    /// Flushes the remaining five state bytes and returns the stream.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..5 {
            self.shift_low();
        }
        self.out
    }
}

// ---------------------------------------------------------------------
// Literal-only LZMA encoder
// ---------------------------------------------------------------------

/// Packs lc/lp/pb into the LZMA properties byte.
pub fn lzma_props_byte(lc: u32, lp: u32, pb: u32) -> u8 {
    ((pb * 5 + lp) * 9 + lc) as u8
}

/// The full 5-byte LZMA properties blob.
pub fn lzma_props(lc: u32, lp: u32, pb: u32, dic_size: u32) -> Vec<u8> {
    let mut out = vec![lzma_props_byte(lc, lp, pb)];
    out.extend_from_slice(&dic_size.to_le_bytes());
    out
}

/// Encodes `data` as a pure-literal LZMA stream without an end marker.
///
/// A decoder given the exact output size reproduces `data` and drains
/// the coder cleanly.
pub fn lzma_encode_literals(data: &[u8], lc: u32, lp: u32, pb: u32) -> Vec<u8> {
    let mut rc = RangeEncoder::new();
    let mut is_match = vec![INITIAL_PROB; 12 << 4];
    let mut literal = vec![INITIAL_PROB; 0x300 << (lc + lp)];
    let pb_mask = (1u32 << pb) - 1;
    let lp_mask = (1u32 << lp) - 1;
    let mut processed = 0u32;
    let mut prev = 0u32;

    for &byte in data {
        // The state machine never leaves state 0 in a literal-only
        // stream.
        let pos_state = (processed & pb_mask) as usize;
        rc.encode_bit(&mut is_match[pos_state], false);

        let ctx = (((processed & lp_mask) << lc) + (prev >> (8 - lc))) as usize;
        let base = 0x300 * ctx;
        let mut symbol = 1usize;
        for i in (0..8).rev() {
            let bit = (byte >> i) & 1 != 0;
            rc.encode_bit(&mut literal[base + symbol], bit);
            symbol = (symbol << 1) | bit as usize;
        }
        processed += 1;
        prev = byte as u32;
    }
    rc.finish()
}

// ---------------------------------------------------------------------
// LZMA2 chunk framing
// ---------------------------------------------------------------------

/// One uncompressed LZMA2 chunk (dictionary reset) plus the terminator.
pub fn lzma2_uncompressed_stream(data: &[u8]) -> Vec<u8> {
    assert!(!data.is_empty() && data.len() <= 0x1_0000);
    let size = data.len() - 1;
    let mut out = vec![0x01, (size >> 8) as u8, size as u8];
    out.extend_from_slice(data);
    out.push(0x00);
    out
}

/// One compressed LZMA2 chunk (full reset, fresh properties) plus the
/// terminator.
pub fn lzma2_compressed_stream(data: &[u8], lc: u32, lp: u32, pb: u32) -> Vec<u8> {
    assert!(!data.is_empty() && data.len() <= 0x20_0000);
    let payload = lzma_encode_literals(data, lc, lp, pb);
    let u = data.len() - 1;
    let p = payload.len() - 1;
    let mut out = vec![
        0xE0 | (u >> 16) as u8,
        (u >> 8) as u8,
        u as u8,
        (p >> 8) as u8,
        p as u8,
        lzma_props_byte(lc, lp, pb),
    ];
    out.extend_from_slice(&payload);
    out.push(0x00);
    out
}

// ---------------------------------------------------------------------
// BCJ2 stream splitter
// ---------------------------------------------------------------------

/// The four streams produced by splitting x86 code for BCJ2.
pub struct Bcj2Streams {
    pub main: Vec<u8>,
    pub call: Vec<u8>,
    pub jump: Vec<u8>,
    pub control: Vec<u8>,
}

fn is_jcc(b0: u8, b1: u8) -> bool {
    b0 == 0x0F && (b1 & 0xF0) == 0x80
}

fn is_j(b0: u8, b1: u8) -> bool {
    (b1 & 0xFE) == 0xE8 || is_jcc(b0, b1)
}

/// Splits `data` into BCJ2's four streams, converting every branch that
/// has a full 4-byte operand.
pub fn bcj2_encode(data: &[u8]) -> Bcj2Streams {
    let mut rc = RangeEncoder::new();
    let mut probs = vec![INITIAL_PROB; 256 + 2];
    let mut main = Vec::new();
    let mut call = Vec::new();
    let mut jump = Vec::new();
    let mut prev = 0u8;
    let mut i = 0usize;

    while i < data.len() {
        let b = data[i];
        main.push(b);
        // The decoder consults the control stream for every branch
        // opcode except one landing on the very last output byte.
        if is_j(prev, b) && i + 1 < data.len() {
            let model = match b {
                0xE8 => prev as usize,
                0xE9 => 256,
                _ => 257,
            };
            if i + 5 <= data.len() {
                rc.encode_bit(&mut probs[model], true);
                let rel =
                    u32::from_le_bytes([data[i + 1], data[i + 2], data[i + 3], data[i + 4]]);
                let abs = rel.wrapping_add(i as u32 + 5);
                if b == 0xE8 {
                    call.extend_from_slice(&abs.to_be_bytes());
                } else {
                    jump.extend_from_slice(&abs.to_be_bytes());
                }
                prev = data[i + 4];
                i += 5;
                continue;
            }
            rc.encode_bit(&mut probs[model], false);
        }
        prev = b;
        i += 1;
    }

    Bcj2Streams {
        main,
        call,
        jump,
        control: rc.finish(),
    }
}

// ---------------------------------------------------------------------
// Archive builder
// ---------------------------------------------------------------------

/// A coder definition for the header writer.
pub struct CoderDef {
    pub id: &'static [u8],
    /// Explicit (in, out) stream counts for complex coders.
    pub streams: Option<(u64, u64)>,
    pub props: Vec<u8>,
}

impl CoderDef {
    pub fn simple(id: &'static [u8]) -> Self {
        Self {
            id,
            streams: None,
            props: Vec::new(),
        }
    }

    pub fn with_props(id: &'static [u8], props: Vec<u8>) -> Self {
        Self {
            id,
            streams: None,
            props,
        }
    }
}

/// A folder definition for the header writer.
pub struct FolderDef {
    pub coders: Vec<CoderDef>,
    pub bind_pairs: Vec<(u64, u64)>,
    /// Written only when the folder has more than one pack stream.
    pub packed_indices: Vec<u64>,
    pub unpack_sizes: Vec<u64>,
    pub crc: Option<u32>,
}

/// SubStreamsInfo content for solid folders or stored file CRCs.
pub struct SubStreamsDef {
    /// Substream count per folder.
    pub counts: Vec<u64>,
    /// Explicit sizes: the first `count - 1` substreams of each folder.
    pub sizes: Vec<u64>,
    /// Digests, one per substream that needs storing (folders whose
    /// single substream inherits the folder CRC are skipped).
    pub crcs: Vec<Option<u32>>,
}

/// A file table entry for the header writer.
pub struct FileDef {
    pub name: &'static str,
    pub has_stream: bool,
    pub is_dir: bool,
}

impl FileDef {
    pub fn file(name: &'static str) -> Self {
        Self {
            name,
            has_stream: true,
            is_dir: false,
        }
    }

    pub fn dir(name: &'static str) -> Self {
        Self {
            name,
            has_stream: false,
            is_dir: true,
        }
    }

    pub fn empty_file(name: &'static str) -> Self {
        Self {
            name,
            has_stream: false,
            is_dir: false,
        }
    }
}

fn write_coder(out: &mut Vec<u8>, coder: &CoderDef) {
    let mut flags = coder.id.len() as u8;
    if coder.streams.is_some() {
        flags |= 0x10;
    }
    if !coder.props.is_empty() {
        flags |= 0x20;
    }
    out.push(flags);
    out.extend_from_slice(coder.id);
    if let Some((ins, outs)) = coder.streams {
        write_number(out, ins);
        write_number(out, outs);
    }
    if !coder.props.is_empty() {
        write_number(out, coder.props.len() as u64);
        out.extend_from_slice(&coder.props);
    }
}

fn write_bits(out: &mut Vec<u8>, bits: &[bool]) {
    let mut byte = 0u8;
    let mut mask = 0x80u8;
    for &bit in bits {
        if bit {
            byte |= mask;
        }
        mask >>= 1;
        if mask == 0 {
            out.push(byte);
            byte = 0;
            mask = 0x80;
        }
    }
    if mask != 0x80 {
        out.push(byte);
    }
}

/// Writes a complete plain header.
pub fn build_header(
    pack_sizes: &[u64],
    folders: &[FolderDef],
    substreams: Option<&SubStreamsDef>,
    files: &[FileDef],
) -> Vec<u8> {
    let mut h = Vec::new();
    write_number(&mut h, 0x01); // Header

    if !folders.is_empty() {
        write_number(&mut h, 0x04); // MainStreamsInfo

        write_number(&mut h, 0x06); // PackInfo
        write_number(&mut h, 0); // pack_pos
        write_number(&mut h, pack_sizes.len() as u64);
        write_number(&mut h, 0x09); // Size
        for &size in pack_sizes {
            write_number(&mut h, size);
        }
        write_number(&mut h, 0x00);

        write_number(&mut h, 0x07); // UnpackInfo
        write_number(&mut h, 0x0B); // Folder
        write_number(&mut h, folders.len() as u64);
        h.push(0x00); // inline
        for folder in folders {
            write_number(&mut h, folder.coders.len() as u64);
            for coder in &folder.coders {
                write_coder(&mut h, coder);
            }
            for &(in_index, out_index) in &folder.bind_pairs {
                write_number(&mut h, in_index);
                write_number(&mut h, out_index);
            }
            for &index in &folder.packed_indices {
                write_number(&mut h, index);
            }
        }
        write_number(&mut h, 0x0C); // CodersUnpackSize
        for folder in folders {
            for &size in &folder.unpack_sizes {
                write_number(&mut h, size);
            }
        }
        if folders.iter().any(|f| f.crc.is_some()) {
            write_number(&mut h, 0x0A); // CRC
            let defined: Vec<bool> = folders.iter().map(|f| f.crc.is_some()).collect();
            if defined.iter().all(|&d| d) {
                h.push(0x01);
            } else {
                h.push(0x00);
                write_bits(&mut h, &defined);
            }
            for folder in folders {
                if let Some(crc) = folder.crc {
                    h.extend_from_slice(&crc.to_le_bytes());
                }
            }
        }
        write_number(&mut h, 0x00); // end UnpackInfo

        if let Some(ss) = substreams {
            write_number(&mut h, 0x08); // SubStreamsInfo
            write_number(&mut h, 0x0D); // NumUnpackStream
            for &count in &ss.counts {
                write_number(&mut h, count);
            }
            if !ss.sizes.is_empty() {
                write_number(&mut h, 0x09); // Size
                for &size in &ss.sizes {
                    write_number(&mut h, size);
                }
            }
            if !ss.crcs.is_empty() {
                write_number(&mut h, 0x0A); // CRC
                let defined: Vec<bool> = ss.crcs.iter().map(|c| c.is_some()).collect();
                if defined.iter().all(|&d| d) {
                    h.push(0x01);
                } else {
                    h.push(0x00);
                    write_bits(&mut h, &defined);
                }
                for crc in ss.crcs.iter().flatten() {
                    h.extend_from_slice(&crc.to_le_bytes());
                }
            }
            write_number(&mut h, 0x00);
        }

        write_number(&mut h, 0x00); // end MainStreamsInfo
    }

    if !files.is_empty() {
        write_number(&mut h, 0x05); // FilesInfo
        write_number(&mut h, files.len() as u64);

        if files.iter().any(|f| !f.has_stream) {
            let bits: Vec<bool> = files.iter().map(|f| !f.has_stream).collect();
            write_number(&mut h, 0x0E); // EmptyStream
            write_number(&mut h, files.len().div_ceil(8) as u64);
            write_bits(&mut h, &bits);

            let empty_file_bits: Vec<bool> = files
                .iter()
                .filter(|f| !f.has_stream)
                .map(|f| !f.is_dir)
                .collect();
            if empty_file_bits.iter().any(|&b| b) {
                write_number(&mut h, 0x0F); // EmptyFile
                write_number(&mut h, empty_file_bits.len().div_ceil(8) as u64);
                write_bits(&mut h, &empty_file_bits);
            }
        }

        let mut names = vec![0x00u8]; // inline
        for file in files {
            for unit in file.name.encode_utf16() {
                names.extend_from_slice(&unit.to_le_bytes());
            }
            names.extend_from_slice(&[0, 0]);
        }
        write_number(&mut h, 0x11); // Name
        write_number(&mut h, names.len() as u64);
        h.extend_from_slice(&names);

        write_number(&mut h, 0x00); // end FilesInfo
    }

    write_number(&mut h, 0x00); // end Header
    h
}

/// Wraps pack data and a header into a full archive image.
pub fn assemble(pack: &[u8], header: &[u8]) -> Vec<u8> {
    let mut data = vec![0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04];
    let mut payload = Vec::new();
    payload.extend_from_slice(&(pack.len() as u64).to_le_bytes());
    payload.extend_from_slice(&(header.len() as u64).to_le_bytes());
    payload.extend_from_slice(&crc32(header).to_le_bytes());
    data.extend_from_slice(&crc32(&payload).to_le_bytes());
    data.extend_from_slice(&payload);
    data.extend_from_slice(pack);
    data.extend_from_slice(header);
    data
}

/// Like [`assemble`], but stores the header LZMA-compressed behind an
/// `EncodedHeader` stub.
pub fn assemble_encoded(pack: &[u8], header: &[u8]) -> Vec<u8> {
    let packed_header = lzma_encode_literals(header, 3, 0, 2);

    let mut meta = Vec::new();
    write_number(&mut meta, 0x17); // EncodedHeader
    write_number(&mut meta, 0x06); // PackInfo
    write_number(&mut meta, pack.len() as u64); // pack_pos: after the body
    write_number(&mut meta, 1);
    write_number(&mut meta, 0x09);
    write_number(&mut meta, packed_header.len() as u64);
    write_number(&mut meta, 0x00);
    write_number(&mut meta, 0x07); // UnpackInfo
    write_number(&mut meta, 0x0B);
    write_number(&mut meta, 1);
    meta.push(0x00);
    write_number(&mut meta, 1); // one coder
    write_coder(
        &mut meta,
        &CoderDef::with_props(&[0x03, 0x01, 0x01], lzma_props(3, 0, 2, 1 << 16)),
    );
    write_number(&mut meta, 0x0C);
    write_number(&mut meta, header.len() as u64);
    write_number(&mut meta, 0x0A);
    meta.push(0x01);
    meta.extend_from_slice(&crc32(header).to_le_bytes());
    write_number(&mut meta, 0x00); // end UnpackInfo
    write_number(&mut meta, 0x00); // end streams info

    let mut body = pack.to_vec();
    body.extend_from_slice(&packed_header);
    assemble(&body, &meta)
}

// ---------------------------------------------------------------------
// Ready-made folder shapes
// ---------------------------------------------------------------------

pub const ID_COPY: &[u8] = &[0x00];
pub const ID_LZMA: &[u8] = &[0x03, 0x01, 0x01];
pub const ID_LZMA2: &[u8] = &[0x21];
pub const ID_BCJ: &[u8] = &[0x03, 0x03, 0x01, 0x03];
pub const ID_BCJ2: &[u8] = &[0x03, 0x03, 0x01, 0x1B];
pub const ID_ARM: &[u8] = &[0x03, 0x03, 0x05, 0x01];

/// One single-coder folder.
pub fn single_coder_folder(coder: CoderDef, unpack_size: u64, crc: Option<u32>) -> FolderDef {
    FolderDef {
        coders: vec![coder],
        bind_pairs: Vec::new(),
        packed_indices: Vec::new(),
        unpack_sizes: vec![unpack_size],
        crc,
    }
}

/// A main coder whose output runs through an in-place branch filter.
pub fn filtered_folder(
    main: CoderDef,
    filter: CoderDef,
    unpack_size: u64,
    crc: Option<u32>,
) -> FolderDef {
    FolderDef {
        coders: vec![main, filter],
        bind_pairs: vec![(1, 0)],
        packed_indices: Vec::new(),
        unpack_sizes: vec![unpack_size, unpack_size],
        crc,
    }
}

/// The fixed four-coder BCJ2 topology over Copy-coded streams.
///
/// Returns the folder and the pack data laid out in pack-stream order
/// (main, control, call, jump).
pub fn bcj2_copy_folder(data: &[u8], crc: Option<u32>) -> (FolderDef, Vec<Vec<u8>>) {
    let streams = bcj2_encode(data);
    let folder = FolderDef {
        coders: vec![
            CoderDef::simple(ID_COPY),
            CoderDef::simple(ID_COPY),
            CoderDef::simple(ID_COPY),
            CoderDef {
                id: ID_BCJ2,
                streams: Some((4, 1)),
                props: Vec::new(),
            },
        ],
        bind_pairs: vec![(5, 0), (4, 1), (3, 2)],
        packed_indices: vec![2, 6, 1, 0],
        unpack_sizes: vec![
            streams.jump.len() as u64,
            streams.call.len() as u64,
            streams.main.len() as u64,
            data.len() as u64,
        ],
        crc,
    };
    let pack = vec![streams.main, streams.control, streams.call, streams.jump];
    (folder, pack)
}

/// Builds the canonical hello archive: `hello.txt`, "Hello, World!", LZMA2
/// with the 4 KiB dictionary prop, file CRC stored via SubStreamsInfo.
pub fn hello_archive() -> Vec<u8> {
    let content = b"Hello, World!";
    let pack = lzma2_uncompressed_stream(content);
    let folder = single_coder_folder(
        CoderDef::with_props(ID_LZMA2, vec![0x00]),
        content.len() as u64,
        None,
    );
    let substreams = SubStreamsDef {
        counts: vec![1],
        sizes: vec![],
        crcs: vec![Some(crc32(content))],
    };
    let header = build_header(
        &[pack.len() as u64],
        &[folder],
        Some(&substreams),
        &[FileDef::file("hello.txt")],
    );
    assemble(&pack, &header)
}
