//! # zevenz
//!
//! A pure-Rust reader for 7z archives, covering the subset modern
//! producers emit: LZMA and LZMA2 compressed streams, the x86 (BCJ),
//! BCJ2 and ARM branch filters, the Copy pseudo-codec, and the standard
//! header encoding including the LZMA-wrapped `EncodedHeader` form.
//!
//! The reader works over an already-materialised archive image, extracts
//! one file at a time into a caller-owned folder cache, and verifies
//! stream and per-file CRC-32 integrity. It does not write archives and
//! does not support encryption, PPMd/BZip2/Delta codecs or multi-volume
//! sets.
//!
//! ## Reading an archive
//!
//! ```rust,no_run
//! use zevenz::{Archive, FolderCache, Result};
//!
//! fn main() -> Result<()> {
//!     let image = std::fs::read("archive.7z").expect("read archive");
//!     let mut archive = Archive::open(image)?;
//!
//!     for entry in archive.entries() {
//!         println!(
//!             "{}: {} bytes",
//!             String::from_utf16_lossy(entry.name_utf16()),
//!             entry.size()
//!         );
//!     }
//!
//!     // Extracting files of the same solid block in sequence reuses
//!     // the decoded block held in the cache.
//!     let mut cache = FolderCache::new();
//!     let bytes = archive.extract(0, &mut cache)?;
//!     println!("first file: {} bytes", bytes.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! All operations return [`Result<T>`]. Grammar violations surface as
//! [`Error::Data`] or [`Error::Archive`]; valid-but-unimplemented
//! constructs as [`Error::Unsupported`]. CRC failures keep the decoded
//! buffer available for inspection.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod checksum;
pub mod codec;
pub mod error;
pub mod format;
pub mod read;
pub mod source;

pub use error::{Error, Result};
pub use read::{Archive, Entry, FolderCache};
pub use source::{ByteSource, LookAheadReader};
