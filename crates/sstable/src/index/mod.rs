//! Index representations and the strategies that load them.
//!
//! The index file maps keys to data-file offsets. How it is materialized
//! at open time is a strategy choice with different memory/latency
//! trade-offs:
//!
//! | Strategy    | Resident memory      | Get            | Notes |
//! |-------------|----------------------|----------------|-------|
//! | `SliceKey`  | all entries          | binary search  | simplest, the default |
//! | `SortedMap` | all entries          | `BTreeMap`     | keys normalized by a [`KeyMapper`] |
//! | `SkipList`  | all entries          | skip list      | honors arbitrary comparators natively |
//! | `Binary`    | O(1)                 | disk-backed binary search | needs a table written with [`IndexFormat::FlatBinary`](crate::IndexFormat) |
//!
//! Whatever the strategy, the loaded index answers the same small query
//! protocol ([`TableIndex`]), so the reader's `get`/`scan` code is
//! oblivious to the choice.

use std::path::Path;
use std::sync::Arc;

use prost::Message;
use skiplist::Comparator;

use crate::error::{Error, Result};
use crate::proto::IndexEntry;

pub(crate) mod binary;
mod skip_list;
mod slice;
mod sorted_map;

/// Default read buffer for index loading, matching the original's loaders.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Query protocol every loaded index implements.
///
/// The find methods return owned entries (the Binary strategy reads them
/// off disk, so borrowing is not an option), and they return `Result`
/// because disk-backed lookups can fail.
pub trait TableIndex: Send + Sync {
    /// The entry for exactly `key`, if present.
    fn find_exact(&self, key: &[u8]) -> Result<Option<IndexEntry>>;

    /// The entry with the largest key <= `key`.
    fn find_floor(&self, key: &[u8]) -> Result<Option<IndexEntry>>;

    /// The entry with the smallest key >= `key`.
    fn find_ceil(&self, key: &[u8]) -> Result<Option<IndexEntry>>;

    /// In-order iteration over `[lo, hi)`; `None` bounds are unbounded.
    fn iter_range<'a>(
        &'a self,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Box<dyn IndexIterator + 'a>>;
}

/// Pull-iterator over index entries, in key order.
pub trait IndexIterator {
    /// The next entry, or `None` once the range is exhausted.
    fn next_entry(&mut self) -> Result<Option<IndexEntry>>;
}

/// Normalizes raw keys into the `SortedMap` strategy's map keys.
///
/// The mapped keys must sort (in plain byte order) exactly as the raw keys
/// sort under the table's comparator, or floor/ceil and range queries will
/// disagree with the rest of the reader.
pub trait KeyMapper: Send + Sync {
    fn map(&self, key: &[u8]) -> Vec<u8>;
}

/// The identity mapping; correct whenever the table uses byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityKeyMapper;

impl KeyMapper for IdentityKeyMapper {
    fn map(&self, key: &[u8]) -> Vec<u8> {
        key.to_vec()
    }
}

/// Caps keys at a fixed width. Meant for tables whose keys are uniform
/// fixed-size digests (e.g. 20-byte content hashes), where anything past
/// the width cannot exist and longer probe keys can be clipped safely.
#[derive(Debug, Clone, Copy)]
pub struct FixedWidthKeyMapper {
    pub width: usize,
}

impl KeyMapper for FixedWidthKeyMapper {
    fn map(&self, key: &[u8]) -> Vec<u8> {
        key[..key.len().min(self.width)].to_vec()
    }
}

/// Strategy for materializing the index file, chosen per reader open.
#[derive(Clone)]
pub enum IndexLoader {
    /// Contiguous sorted vector, binary-searched under the comparator.
    SliceKey { read_buffer_size: usize },
    /// `BTreeMap` keyed by [`KeyMapper`]-normalized keys.
    SortedMap {
        read_buffer_size: usize,
        mapper: Arc<dyn KeyMapper>,
    },
    /// Skip list built over the table comparator.
    SkipList { read_buffer_size: usize },
    /// Disk-backed binary search over a flat binary index file.
    Binary,
}

impl Default for IndexLoader {
    fn default() -> Self {
        IndexLoader::slice_key()
    }
}

impl IndexLoader {
    #[must_use]
    pub fn slice_key() -> Self {
        IndexLoader::SliceKey {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    #[must_use]
    pub fn sorted_map(mapper: Arc<dyn KeyMapper>) -> Self {
        IndexLoader::SortedMap {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            mapper,
        }
    }

    #[must_use]
    pub fn skip_list() -> Self {
        IndexLoader::SkipList {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    #[must_use]
    pub fn binary() -> Self {
        IndexLoader::Binary
    }

    pub(crate) fn load(
        &self,
        index_path: &Path,
        cmp: Arc<dyn Comparator>,
    ) -> Result<Box<dyn TableIndex>> {
        match self {
            IndexLoader::SliceKey { read_buffer_size } => Ok(Box::new(
                slice::SliceKeyIndex::load(index_path, cmp, *read_buffer_size)?,
            )),
            IndexLoader::SortedMap {
                read_buffer_size,
                mapper,
            } => Ok(Box::new(sorted_map::SortedMapIndex::load(
                index_path,
                Arc::clone(mapper),
                *read_buffer_size,
            )?)),
            IndexLoader::SkipList { read_buffer_size } => Ok(Box::new(
                skip_list::SkipListIndex::load(index_path, cmp, *read_buffer_size)?,
            )),
            IndexLoader::Binary => Ok(Box::new(binary::BinaryIndex::open(index_path, cmp)?)),
        }
    }
}

/// Decodes every [`IndexEntry`] from a recordio index file, in file order
/// (which is key order, by the writer's invariant).
pub(crate) fn read_index_entries(path: &Path, read_buffer_size: usize) -> Result<Vec<IndexEntry>> {
    let mut reader = recordio::FileReader::open(path, read_buffer_size)?;
    let mut entries = Vec::new();
    while let Some(payload) = reader.read_next()? {
        let entry = IndexEntry::decode(payload.as_slice())
            .map_err(|e| Error::CorruptTable(format!("undecodable index entry: {e}")))?;
        entries.push(entry);
    }
    Ok(entries)
}
