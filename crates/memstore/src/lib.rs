//! # MemStore - in-memory sorted write buffer
//!
//! Buffers writes in key order (skiplist-backed) until the caller flushes
//! the whole thing into an immutable SSTable. This is the producing side
//! of the table engine's contract: an ordered stream of `(key, value)`
//! pairs, terminated by iterator exhaustion.
//!
//! Deletes are tombstones: the key stays in the buffer with no value and
//! flushes as an empty value, which is the table's null sentinel (the
//! metadata counts these in `null_values`).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use memstore::MemStore;
//! use sstable::{BytewiseComparator, WriterOptions};
//!
//! let mut store = MemStore::new();
//! store.add(b"hello", b"world").unwrap();
//! store.upsert(b"hello", b"again");
//! store.flush(
//!     WriterOptions::new()
//!         .base_path("/tmp/table")
//!         .key_comparator(Arc::new(BytewiseComparator)),
//! )
//! .unwrap();
//! ```

use std::sync::Arc;

use skiplist::{BytewiseComparator, Comparator, SkipListMap};
use sstable::{SSTableStreamWriter, WriterOptions};
use thiserror::Error;
use tracing::debug;

/// Errors from the buffer's own bookkeeping. Flush errors come from
/// [`sstable`] instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemStoreError {
    /// `add` was called for a key that is already buffered.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// `delete` was called for a key that is not buffered.
    #[error("key not found")]
    KeyNotFound,
}

/// A buffered cell: a live value or a tombstone.
enum Cell {
    Value(Vec<u8>),
    Tombstone,
}

impl Cell {
    fn value_len(&self) -> usize {
        match self {
            Cell::Value(v) => v.len(),
            Cell::Tombstone => 0,
        }
    }
}

/// Sorted buffer of pending writes.
pub struct MemStore {
    map: SkipListMap<Cell>,
    /// Running sum of buffered key and value bytes.
    estimated_size: usize,
}

impl MemStore {
    /// A store ordered by plain byte comparison.
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(Arc::new(BytewiseComparator))
    }

    /// A store ordered by `cmp`; flush the table with the same comparator.
    #[must_use]
    pub fn with_comparator(cmp: Arc<dyn Comparator>) -> Self {
        Self {
            map: SkipListMap::new(cmp),
            estimated_size: 0,
        }
    }

    /// Buffers a new key. Fails with [`MemStoreError::KeyAlreadyExists`]
    /// if the key is present (tombstoned counts as present).
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), MemStoreError> {
        if self.map.contains_key(key) {
            return Err(MemStoreError::KeyAlreadyExists);
        }
        self.estimated_size += key.len() + value.len();
        self.map.insert(key.to_vec(), Cell::Value(value.to_vec()));
        Ok(())
    }

    /// Buffers a key, replacing whatever was there.
    pub fn upsert(&mut self, key: &[u8], value: &[u8]) {
        self.estimated_size += value.len();
        match self.map.insert(key.to_vec(), Cell::Value(value.to_vec())) {
            Some(old) => self.estimated_size -= old.value_len(),
            None => self.estimated_size += key.len(),
        }
    }

    /// Tombstones a key. Fails with [`MemStoreError::KeyNotFound`] if the
    /// key is not buffered.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), MemStoreError> {
        if !self.map.contains_key(key) {
            return Err(MemStoreError::KeyNotFound);
        }
        self.tombstone(key);
        Ok(())
    }

    /// Tombstones a key whether or not it is buffered.
    pub fn delete_if_exists(&mut self, key: &[u8]) {
        self.tombstone(key);
    }

    fn tombstone(&mut self, key: &[u8]) {
        match self.map.insert(key.to_vec(), Cell::Tombstone) {
            Some(old) => self.estimated_size -= old.value_len(),
            None => self.estimated_size += key.len(),
        }
    }

    /// The buffered value, or `None` for missing and tombstoned keys.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.map.get(key)? {
            Cell::Value(v) => Some(v.as_slice()),
            Cell::Tombstone => None,
        }
    }

    /// True if the key is buffered with a live value.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Number of buffered cells, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Rough buffered byte count (keys + live values), for flush
    /// thresholds.
    #[must_use]
    pub fn estimated_size_bytes(&self) -> usize {
        self.estimated_size
    }

    /// Ordered iteration over every cell; tombstones yield `None`.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], Option<&[u8]>)> {
        self.map.iter().map(|(key, cell)| {
            let value = match cell {
                Cell::Value(v) => Some(v.as_slice()),
                Cell::Tombstone => None,
            };
            (key, value)
        })
    }

    /// Streams the whole buffer into a new SSTable at the options' base
    /// path. Tombstones are written as empty values. The buffer itself is
    /// untouched; callers usually drop it after a successful flush.
    pub fn flush(&self, options: WriterOptions) -> sstable::Result<()> {
        let mut writer = SSTableStreamWriter::open(options)?;
        for (key, value) in self.iter() {
            if let Err(e) = writer.write_next(key, value.unwrap_or(&[])) {
                let mut errors = vec![e];
                if let Err(close_err) = writer.close() {
                    errors.push(close_err);
                }
                return Err(match errors.len() {
                    1 => errors.remove(0),
                    _ => sstable::Error::Multiple(sstable::ErrorChain(errors)),
                });
            }
        }
        let result = writer.close();
        debug!(
            cells = self.len(),
            bytes = self.estimated_size,
            "flushed memstore"
        );
        result
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
