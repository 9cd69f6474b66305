//! Byte sources and the buffered look-ahead reader.
//!
//! The archive body is consumed through two layers: a [`ByteSource`] is
//! an already-materialised image that can be read at arbitrary offsets,
//! and [`LookAheadReader`] is a small buffered window over it with the
//! seek/look/skip protocol the decoders drive.

use crate::{Error, Result};

/// Size of the look-ahead window (16 KiB).
pub const LOOK_BUF_SIZE: usize = 1 << 14;

/// A random-access byte image.
///
/// Implementations are infallible: a read at or past the end simply
/// returns fewer (possibly zero) bytes. The reader layers turn short
/// reads into typed errors where the format demands completeness.
pub trait ByteSource {
    /// Total length of the image in bytes.
    fn len(&self) -> u64;

    /// Copies up to `buf.len()` bytes starting at `offset` into `buf`,
    /// returning how many were copied.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize;

    /// Returns true if the image is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ByteSource for &[u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        if offset >= <[u8]>::len(self) as u64 {
            return 0;
        }
        let start = offset as usize;
        let n = buf.len().min(<[u8]>::len(self) - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        n
    }
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        self.as_slice().read_at(offset, buf)
    }
}

/// A buffered view over a [`ByteSource`] with absolute seeks.
///
/// `look` exposes whatever is currently buffered (which may be more or
/// fewer bytes than asked for), `skip` advances the read cursor within
/// the window, and `read_all` loops the two to fill a caller buffer.
pub struct LookAheadReader<S> {
    source: S,
    /// Next source offset the window will be refilled from.
    data_pos: u64,
    /// Read cursor within the window.
    pos: usize,
    /// Number of valid bytes in the window.
    size: usize,
    window: Vec<u8>,
}

impl<S: ByteSource> LookAheadReader<S> {
    /// Creates a reader positioned at offset 0.
    pub fn new(source: S) -> Self {
        Self {
            source,
            data_pos: 0,
            pos: 0,
            size: 0,
            window: vec![0; LOOK_BUF_SIZE],
        }
    }

    /// Length of the underlying source.
    pub fn source_len(&self) -> u64 {
        self.source.len()
    }

    /// Discards the window and repositions at `offset`.
    ///
    /// Seeking at or past the end of the source fails with [`Error::Read`].
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.pos = 0;
        self.size = 0;
        if offset >= self.source.len() {
            return Err(Error::Read);
        }
        self.data_pos = offset;
        Ok(())
    }

    /// Returns the buffered bytes at the cursor, refilling the window
    /// first when fewer than `want` bytes are buffered.
    ///
    /// The returned slice may be shorter than `want` (only near the end
    /// of the source) or longer. An empty slice means end of source.
    pub fn look(&mut self, want: usize) -> &[u8] {
        let in_buf = self.size - self.pos;
        if want > in_buf {
            self.window.copy_within(self.pos..self.size, 0);
            self.pos = 0;
            let got = self
                .source
                .read_at(self.data_pos, &mut self.window[in_buf..]);
            self.data_pos += got as u64;
            self.size = in_buf + got;
        }
        &self.window[self.pos..self.size]
    }

    /// Advances the read cursor by `n` bytes.
    ///
    /// `n` must not exceed the length last returned by [`Self::look`].
    pub fn skip(&mut self, n: usize) {
        debug_assert!(n <= self.size - self.pos);
        self.pos += n;
    }

    /// Fills `out` completely, failing with [`Error::InputEof`] if the
    /// source runs out first.
    pub fn read_all(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < out.len() {
            let chunk = self.look(out.len() - filled);
            if chunk.is_empty() {
                return Err(Error::InputEof);
            }
            let n = chunk.len().min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&chunk[..n]);
            filled += n;
            self.skip(n);
        }
        Ok(())
    }
}
