use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use bloom::BloomFilter;
use prost::Message;
use recordio::{Compression, FileWriter};
use skiplist::{Comparator, SkipListMap};
use tracing::debug;

use crate::error::{join, Error, Result};
use crate::index::binary::FlatIndexWriter;
use crate::proto::{IndexEntry, MetaData};
use crate::{
    value_checksum, BLOOM_FILE_NAME, DATA_FILE_NAME, INDEX_FILE_NAME, META_FILE_NAME, VERSION,
};

/// Default write buffer for the streaming writer.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;
/// Write buffer used by [`SSTableSimpleWriter`]: small tables, small
/// buffers.
pub const SIMPLE_WRITER_BUFFER_SIZE: usize = 4 * 1024;

/// On-disk shape of the index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    /// A recordio stream of prost-encoded [`IndexEntry`] records. Readable
    /// by the SliceKey, SortedMap and SkipList strategies.
    #[default]
    Recordio,
    /// A flat, offset-addressable binary file. Required by (and only
    /// readable through) the Binary index strategy. The index compression
    /// setting does not apply to this format.
    FlatBinary,
}

/// Writer configuration. `base_path` and `key_comparator` are required;
/// everything else has the defaults listed on its setter.
#[derive(Clone)]
pub struct WriterOptions {
    pub(crate) base_path: Option<PathBuf>,
    pub(crate) key_comparator: Option<Arc<dyn Comparator>>,
    pub(crate) enable_bloom_filter: bool,
    pub(crate) bloom_expected_number_of_elements: u64,
    pub(crate) bloom_false_positive_probability: f64,
    pub(crate) index_compression: Compression,
    pub(crate) data_compression: Compression,
    pub(crate) write_buffer_size_bytes: usize,
    pub(crate) index_format: IndexFormat,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_path: None,
            key_comparator: None,
            enable_bloom_filter: true,
            bloom_expected_number_of_elements: 1000,
            bloom_false_positive_probability: 0.01,
            index_compression: Compression::None,
            data_compression: Compression::Snappy,
            write_buffer_size_bytes: DEFAULT_WRITE_BUFFER_SIZE,
            index_format: IndexFormat::Recordio,
        }
    }

    /// The table directory (required). Created if absent.
    #[must_use]
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Total order over keys (required).
    #[must_use]
    pub fn key_comparator(mut self, cmp: Arc<dyn Comparator>) -> Self {
        self.key_comparator = Some(cmp);
        self
    }

    /// Whether to build a bloom file. Default: true.
    #[must_use]
    pub fn enable_bloom_filter(mut self, enabled: bool) -> Self {
        self.enable_bloom_filter = enabled;
        self
    }

    /// Bloom sizing input. Default: 1000.
    #[must_use]
    pub fn bloom_expected_number_of_elements(mut self, n: u64) -> Self {
        self.bloom_expected_number_of_elements = n;
        self
    }

    /// Bloom sizing input. Default: 0.01.
    #[must_use]
    pub fn bloom_false_positive_probability(mut self, p: f64) -> Self {
        self.bloom_false_positive_probability = p;
        self
    }

    /// Compression for the index file. Default: none, which keeps the
    /// index cheap to re-read at open time.
    #[must_use]
    pub fn index_compression(mut self, compression: Compression) -> Self {
        self.index_compression = compression;
        self
    }

    /// Compression for the data file. Default: snappy.
    #[must_use]
    pub fn data_compression(mut self, compression: Compression) -> Self {
        self.data_compression = compression;
        self
    }

    /// Buffer size for both file writers. Default: 4 MiB.
    #[must_use]
    pub fn write_buffer_size_bytes(mut self, bytes: usize) -> Self {
        self.write_buffer_size_bytes = bytes;
        self
    }

    /// Index file shape. Default: [`IndexFormat::Recordio`].
    #[must_use]
    pub fn index_format(mut self, format: IndexFormat) -> Self {
        self.index_format = format;
        self
    }
}

/// Either shape of index writer, behind one append/close surface.
enum IndexFileWriter {
    Recordio(FileWriter),
    Flat(FlatIndexWriter),
}

impl IndexFileWriter {
    fn append(&mut self, entry: &IndexEntry) -> Result<u64> {
        match self {
            IndexFileWriter::Recordio(w) => Ok(w.append(&entry.encode_to_vec())?),
            IndexFileWriter::Flat(w) => w.append(entry),
        }
    }

    fn close(self) -> Result<u64> {
        match self {
            IndexFileWriter::Recordio(w) => Ok(w.close()?),
            IndexFileWriter::Flat(w) => w.close(),
        }
    }
}

/// Streaming table builder.
///
/// Feed it strictly ascending keys with
/// [`write_next`](SSTableStreamWriter::write_next), then
/// [`close`](SSTableStreamWriter::close) it; only a successful close
/// produces a readable table. The state machine lives in the type: `open`
/// is the only way to get a writer and `close` consumes it.
pub struct SSTableStreamWriter {
    base_path: PathBuf,
    cmp: Arc<dyn Comparator>,
    index: IndexFileWriter,
    data: FileWriter,
    meta_file: File,
    meta_path: PathBuf,
    meta: MetaData,
    bloom: Option<BloomFilter>,
    last_key: Option<Vec<u8>>,
}

impl std::fmt::Debug for SSTableStreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableStreamWriter")
            .field("base_path", &self.base_path)
            .field("meta_path", &self.meta_path)
            .field("meta", &self.meta)
            .field("bloom", &self.bloom)
            .field("last_key", &self.last_key)
            .finish_non_exhaustive()
    }
}

impl SSTableStreamWriter {
    /// Validates the options, creates the table directory and opens every
    /// file the table needs.
    pub fn open(options: WriterOptions) -> Result<Self> {
        let base_path = options
            .base_path
            .ok_or_else(|| Error::InvalidArgument("base_path was not supplied".into()))?;
        let cmp = options
            .key_comparator
            .ok_or_else(|| Error::InvalidArgument("no key comparator supplied".into()))?;
        if options.enable_bloom_filter {
            if options.bloom_expected_number_of_elements == 0 {
                return Err(Error::InvalidArgument(
                    "bloom filter expects a positive number of elements".into(),
                ));
            }
            let p = options.bloom_false_positive_probability;
            if !(p > 0.0 && p < 1.0) {
                return Err(Error::InvalidArgument(format!(
                    "bloom false positive probability must be in (0, 1), was {p}"
                )));
            }
        }

        fs::create_dir_all(&base_path).map_err(|e| Error::io(&base_path, e))?;

        let index_path = base_path.join(INDEX_FILE_NAME);
        let index = match options.index_format {
            IndexFormat::Recordio => IndexFileWriter::Recordio(FileWriter::open(
                &index_path,
                options.index_compression,
                options.write_buffer_size_bytes,
            )?),
            IndexFormat::FlatBinary => IndexFileWriter::Flat(FlatIndexWriter::open(
                &index_path,
                options.write_buffer_size_bytes,
            )?),
        };
        let data = FileWriter::open(
            base_path.join(DATA_FILE_NAME),
            options.data_compression,
            options.write_buffer_size_bytes,
        )?;

        let meta_path = base_path.join(META_FILE_NAME);
        let meta_file = File::create(&meta_path).map_err(|e| Error::io(&meta_path, e))?;

        let bloom = options.enable_bloom_filter.then(|| {
            BloomFilter::new(
                options.bloom_expected_number_of_elements,
                options.bloom_false_positive_probability,
            )
        });

        debug!(base_path = %base_path.display(), "opened sstable writer");

        Ok(Self {
            base_path,
            cmp,
            index,
            data,
            meta_file,
            meta_path,
            meta: MetaData {
                version: VERSION,
                ..MetaData::default()
            },
            bloom,
            last_key: None,
        })
    }

    /// Appends one entry. `key` must be strictly greater than the previous
    /// key under the table's comparator; an empty `value` is the null
    /// sentinel and is counted in the metadata.
    pub fn write_next(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        match &mut self.last_key {
            Some(last) => {
                match self.cmp.compare(last, key) {
                    Ordering::Equal => return Err(Error::DuplicateKey),
                    Ordering::Greater => return Err(Error::OutOfOrderKey),
                    Ordering::Less => {}
                }
                // keeps the allocation when key sizes repeat
                last.clear();
                last.extend_from_slice(key);
            }
            None => {
                self.meta.min_key = key.to_vec();
                self.last_key = Some(key.to_vec());
            }
        }

        if let Some(bloom) = &mut self.bloom {
            bloom.insert(key);
        }

        let checksum = value_checksum(value);
        let pre_write_offset = self.data.size();
        let value_offset = self.data.append(value)?;

        let entry = IndexEntry {
            key: key.to_vec(),
            value_offset,
            checksum,
        };
        if let Err(index_err) = self.index.append(&entry) {
            // roll the data file back so no orphan payload outlives the
            // missing index entry
            let mut errors = vec![index_err];
            if let Err(seek_err) = self.data.seek(pre_write_offset) {
                errors.push(seek_err.into());
            }
            return join(errors);
        }

        self.meta.num_records += 1;
        if value.is_empty() {
            self.meta.null_values += 1;
        }
        Ok(())
    }

    /// Finalizes the table: closes the index and data writers, persists
    /// the bloom filter, then writes the metadata blob, in that order,
    /// every step attempted even after earlier failures, all failures
    /// joined into the returned error. A table whose close failed should
    /// be treated as unreadable.
    pub fn close(self) -> Result<()> {
        let SSTableStreamWriter {
            base_path,
            cmp: _,
            index,
            data,
            mut meta_file,
            meta_path,
            mut meta,
            bloom,
            last_key,
        } = self;

        let mut errors: Vec<Error> = Vec::new();

        let index_bytes = match index.close() {
            Ok(n) => n,
            Err(e) => {
                errors.push(e);
                0
            }
        };
        let data_bytes = match data.close() {
            Ok(n) => n,
            Err(e) => {
                errors.push(e.into());
                0
            }
        };

        if let Some(bloom) = bloom {
            let bloom_path = base_path.join(BLOOM_FILE_NAME);
            if let Err(e) = bloom.write_file(&bloom_path) {
                errors.push(Error::io(&bloom_path, e));
            }
        }

        if let Some(last) = last_key {
            meta.max_key = last;
        }
        meta.data_bytes = data_bytes;
        meta.index_bytes = index_bytes;
        meta.total_bytes = data_bytes + index_bytes;

        let encoded = meta.encode_to_vec();
        if let Err(e) = meta_file
            .write_all(&encoded)
            .and_then(|()| meta_file.sync_all())
        {
            errors.push(Error::io(&meta_path, e));
        }

        debug!(
            base_path = %base_path.display(),
            num_records = meta.num_records,
            total_bytes = meta.total_bytes,
            "closed sstable writer"
        );
        join(errors)
    }
}

/// Convenience wrapper that writes a whole sorted map as one table.
///
/// Correctness-equivalent to driving [`SSTableStreamWriter`] by hand; it
/// only trims the ceremony (and the write buffer, since these tables tend
/// to be small).
pub struct SSTableSimpleWriter {
    options: WriterOptions,
}

impl SSTableSimpleWriter {
    #[must_use]
    pub fn new(options: WriterOptions) -> Self {
        Self {
            options: options.write_buffer_size_bytes(SIMPLE_WRITER_BUFFER_SIZE),
        }
    }

    /// Streams every entry of `map` into a new table and closes it.
    pub fn write_skip_list_map<V: AsRef<[u8]>>(self, map: &SkipListMap<V>) -> Result<()> {
        let mut writer = SSTableStreamWriter::open(self.options)?;
        for (key, value) in map.iter() {
            if let Err(e) = writer.write_next(key, value.as_ref()) {
                let mut errors = vec![e];
                if let Err(close_err) = writer.close() {
                    errors.push(close_err);
                }
                return join(errors);
            }
        }
        writer.close()
    }
}
