//! # SSTable - immutable sorted tables on disk
//!
//! Takes a finite, key-ordered stream of `(key, value)` byte pairs and
//! serializes it into a self-describing table directory; later answers
//! point lookups (`get`), full scans and bounded range scans over it.
//! Tables are *write-once, read-many*; a finished directory is never
//! mutated.
//!
//! ## Table directory layout
//!
//! ```text
//! <base>/
//!   data    # recordio stream of value payloads (snappy by default)
//!   index   # recordio stream of IndexEntry records (uncompressed by
//!           # default), or a flat binary index (IndexFormat::FlatBinary)
//!   meta    # one prost-encoded MetaData blob, written at close
//!   bloom   # optional serialized bloom filter over the keys
//! ```
//!
//! Every index entry carries a CRC-64/ISO checksum of its value, verified
//! on each read; the recordio frames carry their own CRC-32s. A table
//! whose writer never reached a successful
//! [`close`](SSTableStreamWriter::close) has no decodable `meta` and is
//! refused by the reader.
//!
//! ## Writing
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sstable::{BytewiseComparator, SSTableStreamWriter, WriterOptions};
//!
//! let opts = WriterOptions::new()
//!     .base_path("/tmp/table")
//!     .key_comparator(Arc::new(BytewiseComparator));
//! let mut writer = SSTableStreamWriter::open(opts).unwrap();
//! writer.write_next(b"a", b"1").unwrap();
//! writer.write_next(b"b", b"2").unwrap();
//! writer.close().unwrap();
//! ```
//!
//! ## Reading
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sstable::{BytewiseComparator, ReaderOptions, SSTableReader};
//!
//! let reader = SSTableReader::open(
//!     ReaderOptions::new()
//!         .base_path("/tmp/table")
//!         .key_comparator(Arc::new(BytewiseComparator)),
//! )
//! .unwrap();
//! assert_eq!(reader.get(b"a").unwrap(), Some(b"1".to_vec()));
//! for pair in reader.scan().unwrap() {
//!     let (key, value) = pair.unwrap();
//!     println!("{key:?} = {value:?}");
//! }
//! ```
//!
//! How the index is materialized at open time is pluggable; see
//! [`IndexLoader`] for the four strategies and their trade-offs.

use crc::{Crc, CRC_64_GO_ISO};

mod data_loader;
mod error;
mod index;
pub mod proto;
mod reader;
mod writer;

pub use data_loader::{DataLoader, RecordioDataLoader};
pub use error::{Error, ErrorChain, Result};
pub use index::{
    FixedWidthKeyMapper, IdentityKeyMapper, IndexIterator, IndexLoader, KeyMapper, TableIndex,
    DEFAULT_READ_BUFFER_SIZE,
};
pub use reader::{ReaderOptions, SSTableReader, Scanner};
pub use writer::{
    IndexFormat, SSTableSimpleWriter, SSTableStreamWriter, WriterOptions,
    DEFAULT_WRITE_BUFFER_SIZE, SIMPLE_WRITER_BUFFER_SIZE,
};

// Re-exported so callers can configure a table without importing the
// support crates themselves.
pub use recordio::Compression;
pub use skiplist::{BytewiseComparator, Comparator, SkipListMap};

/// File names inside a table directory. The directory is the unit of
/// naming; the files are always called this.
pub const DATA_FILE_NAME: &str = "data";
pub const INDEX_FILE_NAME: &str = "index";
pub const META_FILE_NAME: &str = "meta";
pub const BLOOM_FILE_NAME: &str = "bloom";

/// Format version stamped into every table's metadata.
pub const VERSION: u32 = 1;
/// Highest metadata version this build will open.
pub const READER_MAX_VERSION: u32 = 1;

/// CRC-64 with the ISO-3309 polynomial, fixed by the on-disk format.
const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Checksum of a value as stored in its index entry.
pub(crate) fn value_checksum(value: &[u8]) -> u64 {
    CRC64.checksum(value)
}

#[cfg(test)]
mod tests;
