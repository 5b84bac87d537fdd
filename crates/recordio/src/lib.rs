//! # RecordIO - length-prefixed record log files
//!
//! A log-structured file of framed, optionally-compressed records with two
//! guarantees:
//!
//! - records are appended in O(1) and the writer reports each record's
//!   starting byte offset,
//! - any record can be read back given that offset, without scanning the
//!   records before it.
//!
//! The SSTable engine stores value payloads (`data`) and index entries
//! (`index`) in this format.
//!
//! ## File layout
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ HEADER (6 bytes)                                           │
//! │                                                            │
//! │ magic 0x91 0x95 0x00 0x01 | version (u8) | compression (u8)│
//! ├────────────────────────────────────────────────────────────┤
//! │ RECORD (repeated)                                          │
//! │                                                            │
//! │ magic 0x91 (u8)                                            │
//! │ uncompressed_len (varint) | compressed_len (varint)        │
//! │ crc32 (u32 LE)            | payload bytes                  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The CRC32 covers the payload bytes *as stored* (after compression), so
//! silent disk corruption is detected before any decompression is
//! attempted. When the compression code is `none`, `compressed_len` equals
//! `uncompressed_len` and the payload is raw.
//!
//! Compression codes: `0` none, `1` snappy, `2` gzip, `3` lz4. Gzip and
//! lz4 are reserved code points; opening a file that carries them fails
//! with [`Error::UnsupportedFormat`].

use std::io::{self, Read};

use thiserror::Error;

mod reader;
mod writer;

pub use reader::{FileReader, RandomAccessReader};
pub use writer::FileWriter;

/// Leading bytes of every recordio file.
pub const FILE_MAGIC: [u8; 4] = [0x91, 0x95, 0x00, 0x01];
/// Current file format version.
pub const FILE_VERSION: u8 = 1;
/// Size of the file header: magic + version byte + compression byte.
pub const FILE_HEADER_BYTES: u64 = 6;
/// Magic byte that starts every record frame.
pub(crate) const RECORD_MAGIC: u8 = 0x91;

/// Maximum payload size we'll allocate during reads (64 MiB). Prevents OOM
/// on corrupt length prefixes.
pub(crate) const MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Errors produced by recordio readers and writers.
#[derive(Debug, Error)]
pub enum Error {
    /// The file header is missing or carries the wrong magic.
    #[error("corrupt recordio format: {0}")]
    CorruptFormat(String),

    /// A record frame is truncated, oversized or fails its checksum.
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// The file uses a version or compression code this build cannot read.
    #[error("unsupported recordio format: {0}")]
    UnsupportedFormat(String),

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn corrupt_record(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }
}

/// Per-file payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Raw payload bytes.
    #[default]
    None,
    /// Snappy block compression.
    Snappy,
    /// Reserved code point, not supported by this build.
    Gzip,
    /// Reserved code point, not supported by this build.
    Lz4,
}

impl Compression {
    pub(crate) fn code(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Snappy => 1,
            Compression::Gzip => 2,
            Compression::Lz4 => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Snappy),
            2 => Ok(Compression::Gzip),
            3 => Ok(Compression::Lz4),
            other => Err(Error::UnsupportedFormat(format!(
                "unknown compression code {other}"
            ))),
        }
    }

    pub(crate) fn ensure_supported(self) -> Result<Self> {
        match self {
            Compression::None | Compression::Snappy => Ok(self),
            Compression::Gzip | Compression::Lz4 => Err(Error::UnsupportedFormat(format!(
                "compression {self:?} is a reserved code point"
            ))),
        }
    }
}

/// Appends `v` to `buf` as an unsigned LEB128 varint.
pub(crate) fn write_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

/// Reads an unsigned LEB128 varint. At most ten bytes are consumed.
pub(crate) fn read_uvarint<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut v: u64 = 0;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let b = byte[0];
        if shift >= 64 || (shift == 63 && b > 1) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "varint overflows u64",
            ));
        }
        v |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok(v);
        }
        shift += 7;
    }
}

#[cfg(test)]
mod tests;
