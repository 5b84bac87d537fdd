use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use bloom::BloomFilter;
use prost::Message;
use skiplist::Comparator;
use tracing::debug;

use crate::data_loader::{DataLoader, RecordioDataLoader};
use crate::error::{Error, Result};
use crate::index::{IndexIterator, IndexLoader, TableIndex};
use crate::proto::MetaData;
use crate::{
    value_checksum, BLOOM_FILE_NAME, DATA_FILE_NAME, INDEX_FILE_NAME, META_FILE_NAME,
    READER_MAX_VERSION,
};

/// Reader configuration. `base_path` and `key_comparator` are required and
/// must match what the table was written with.
#[derive(Default)]
pub struct ReaderOptions {
    base_path: Option<PathBuf>,
    key_comparator: Option<Arc<dyn Comparator>>,
    index_loader: IndexLoader,
    data_loader: Option<Box<dyn DataLoader>>,
    skip_hash_check_on_load: bool,
}

impl ReaderOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The table directory (required).
    #[must_use]
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Total order over keys (required); must be the order the table was
    /// written under.
    #[must_use]
    pub fn key_comparator(mut self, cmp: Arc<dyn Comparator>) -> Self {
        self.key_comparator = Some(cmp);
        self
    }

    /// Index-loading strategy. Default: [`IndexLoader::slice_key`].
    #[must_use]
    pub fn index_loader(mut self, loader: IndexLoader) -> Self {
        self.index_loader = loader;
        self
    }

    /// How index entries resolve into value bytes. Default: direct reads
    /// on the table's recordio data file.
    #[must_use]
    pub fn data_loader(mut self, loader: Box<dyn DataLoader>) -> Self {
        self.data_loader = Some(loader);
        self
    }

    /// Skips the open-time pass that re-hashes every value against its
    /// index checksum. The pass reads the whole data file, so large tables
    /// open much faster without it; per-read verification still happens
    /// either way. Default: false (verify on load).
    #[must_use]
    pub fn skip_hash_check_on_load(mut self, skip: bool) -> Self {
        self.skip_hash_check_on_load = skip;
        self
    }
}

/// Read handle over one finished table directory.
///
/// Stateless with respect to the table (nothing is ever written back);
/// safe for concurrent `get`/`scan` calls through `&self`. Dropping the
/// reader releases the file handles and whatever memory the index
/// strategy held.
pub struct SSTableReader {
    base_path: PathBuf,
    meta: MetaData,
    bloom: Option<BloomFilter>,
    index: Box<dyn TableIndex>,
    data: Box<dyn DataLoader>,
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("base_path", &self.base_path)
            .field("meta", &self.meta)
            .field("bloom", &self.bloom)
            .finish_non_exhaustive()
    }
}

impl SSTableReader {
    /// Opens a table: decodes and version-gates the metadata, loads the
    /// bloom filter if one exists, materializes the index through the
    /// configured strategy, and (unless skipped) verifies every value
    /// checksum.
    pub fn open(options: ReaderOptions) -> Result<Self> {
        let base_path = options
            .base_path
            .ok_or_else(|| Error::InvalidArgument("base_path was not supplied".into()))?;
        let cmp = options
            .key_comparator
            .ok_or_else(|| Error::InvalidArgument("no key comparator supplied".into()))?;

        let meta_path = base_path.join(META_FILE_NAME);
        let meta_bytes = fs::read(&meta_path).map_err(|e| Error::io(&meta_path, e))?;
        let meta = MetaData::decode(meta_bytes.as_slice())
            .map_err(|e| Error::CorruptTable(format!("undecodable metadata: {e}")))?;
        if meta.version == 0 {
            // an empty or truncated meta file decodes to all defaults;
            // finished tables always carry a version
            return Err(Error::CorruptTable(
                "metadata carries no version; the table was never finalized".into(),
            ));
        }
        if meta.version > READER_MAX_VERSION {
            return Err(Error::UnsupportedVersion {
                found: meta.version,
                max: READER_MAX_VERSION,
            });
        }

        let bloom_path = base_path.join(BLOOM_FILE_NAME);
        let bloom = if bloom_path.exists() {
            Some(BloomFilter::read_file(&bloom_path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    Error::CorruptTable(format!("bloom filter: {e}"))
                } else {
                    Error::io(&bloom_path, e)
                }
            })?)
        } else {
            None
        };

        let index = options
            .index_loader
            .load(&base_path.join(INDEX_FILE_NAME), Arc::clone(&cmp))?;

        let data: Box<dyn DataLoader> = match options.data_loader {
            Some(loader) => loader,
            None => Box::new(RecordioDataLoader::open(base_path.join(DATA_FILE_NAME))?),
        };

        let reader = Self {
            base_path,
            meta,
            bloom,
            index,
            data,
        };

        if !options.skip_hash_check_on_load {
            reader.verify_all_checksums()?;
        }

        debug!(
            base_path = %reader.base_path.display(),
            num_records = reader.meta.num_records,
            "opened sstable reader"
        );
        Ok(reader)
    }

    /// Walks the whole index and re-hashes every value against its stored
    /// checksum. Expensive: one full pass over the data file.
    fn verify_all_checksums(&self) -> Result<()> {
        let mut entries = self.index.iter_range(None, None)?;
        while let Some(entry) = entries.next_entry()? {
            let value = self.data.load(&entry)?;
            let actual = value_checksum(&value);
            if actual != entry.checksum {
                return Err(Error::ChecksumMismatch {
                    offset: entry.value_offset,
                    expected: entry.checksum,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// The table's metadata, decoded at open.
    #[must_use]
    pub fn metadata(&self) -> &MetaData {
        &self.meta
    }

    /// Bloom-only fast path: `false` means the key is definitely absent.
    /// Without a bloom file this is always `true` (absence can't be
    /// proven), so it is only meaningful on tables written with the filter
    /// enabled.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.bloom.as_ref().map_or(true, |b| b.may_contain(key))
    }

    /// Point lookup. `Ok(None)` when the key is not in the table; the
    /// value's checksum is verified before it is returned.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(bloom) = &self.bloom {
            if !bloom.may_contain(key) {
                return Ok(None);
            }
        }
        let entry = match self.index.find_exact(key)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let value = self.data.load(&entry)?;
        let actual = value_checksum(&value);
        if actual != entry.checksum {
            return Err(Error::ChecksumMismatch {
                offset: entry.value_offset,
                expected: entry.checksum,
                actual,
            });
        }
        Ok(Some(value))
    }

    /// Full-table iterator in ascending key order.
    pub fn scan(&self) -> Result<Scanner<'_>> {
        self.scan_range(None, None)
    }

    /// Iterator over the half-open range `[lo, hi)`; a `None` bound is
    /// unbounded on that side. Bounds are compared under the table's
    /// comparator.
    pub fn scan_range(&self, lo: Option<&[u8]>, hi: Option<&[u8]>) -> Result<Scanner<'_>> {
        let entries = self.index.iter_range(lo, hi)?;
        Ok(Scanner {
            reader: self,
            entries,
            done: false,
        })
    }

    /// Iterator positioned at the smallest key >= `key`, unbounded above.
    pub fn scan_starting_at(&self, key: &[u8]) -> Result<Scanner<'_>> {
        self.scan_range(Some(key), None)
    }
}

/// Single-pass `(key, value)` iterator borrowing its reader's handles.
///
/// Yields pairs in ascending key order and verifies each value's checksum
/// on the way through. The first error fuses the iterator.
pub struct Scanner<'a> {
    reader: &'a SSTableReader,
    entries: Box<dyn IndexIterator + 'a>,
    done: bool,
}

impl Iterator for Scanner<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let entry = match self.entries.next_entry() {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let value = match self.reader.data.load(&entry) {
            Ok(value) => value,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        let actual = value_checksum(&value);
        if actual != entry.checksum {
            self.done = true;
            return Some(Err(Error::ChecksumMismatch {
                offset: entry.value_offset,
                expected: entry.checksum,
                actual,
            }));
        }
        Some(Ok((entry.key, value)))
    }
}
