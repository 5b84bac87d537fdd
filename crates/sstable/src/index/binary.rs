//! Flat binary index files and the disk-backed Binary strategy.
//!
//! Tables written with [`IndexFormat::FlatBinary`](crate::IndexFormat)
//! store the index as a flat, offset-addressable file instead of a
//! recordio stream:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ HEADER (6 bytes)                                         │
//! │ magic "FIX1" (u32 LE) | version (u8) | reserved (u8)     │
//! ├──────────────────────────────────────────────────────────┤
//! │ ENTRY (repeated, streamed while writing)                 │
//! │ key_len (u32) | key | value_offset (u64) | checksum (u64)│
//! ├──────────────────────────────────────────────────────────┤
//! │ SLOT TABLE (written at close)                            │
//! │ entry file offset (u64) ... one per entry                │
//! ├──────────────────────────────────────────────────────────┤
//! │ TRAILER (always last 20 bytes)                           │
//! │ table_offset (u64) | count (u64) | magic (u32)           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers little-endian. The fixed-width slot table is what makes
//! binary search possible without loading anything: probe slot `mid`, read
//! the entry it points at, compare keys. The reader side keeps O(1)
//! resident memory at the price of O(log n) seeks per lookup.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use skiplist::Comparator;

use super::{IndexIterator, TableIndex};
use crate::error::{Error, Result};
use crate::proto::IndexEntry;

/// "FIX1", distinct from the recordio file magic so a mismatched loader
/// fails loudly at open.
const FLAT_INDEX_MAGIC: u32 = 0x4649_5831;
const FLAT_INDEX_VERSION: u8 = 1;
const HEADER_BYTES: u64 = 6;
const TRAILER_BYTES: u64 = 20;

/// Maximum key size we'll allocate during reads (64 KiB). Prevents OOM on
/// corrupt files.
const MAX_KEY_BYTES: usize = 64 * 1024;

/// Streaming writer for the flat binary index format.
pub(crate) struct FlatIndexWriter {
    file: BufWriter<File>,
    path: PathBuf,
    /// File offset of each entry, in write order; becomes the slot table.
    entry_offsets: Vec<u64>,
    size: u64,
}

impl FlatIndexWriter {
    pub(crate) fn open(path: &Path, write_buffer_size: usize) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut file = BufWriter::with_capacity(write_buffer_size.max(64), file);
        file.write_u32::<LittleEndian>(FLAT_INDEX_MAGIC)
            .and_then(|()| file.write_u8(FLAT_INDEX_VERSION))
            .and_then(|()| file.write_u8(0))
            .map_err(|e| Error::io(path, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            entry_offsets: Vec::new(),
            size: HEADER_BYTES,
        })
    }

    pub(crate) fn append(&mut self, entry: &IndexEntry) -> Result<u64> {
        let offset = self.size;
        self.write_entry(entry)
            .map_err(|e| Error::io(&self.path, e))?;
        self.size += 4 + entry.key.len() as u64 + 16;
        self.entry_offsets.push(offset);
        Ok(offset)
    }

    fn write_entry(&mut self, entry: &IndexEntry) -> io::Result<()> {
        self.file.write_u32::<LittleEndian>(entry.key.len() as u32)?;
        self.file.write_all(&entry.key)?;
        self.file.write_u64::<LittleEndian>(entry.value_offset)?;
        self.file.write_u64::<LittleEndian>(entry.checksum)
    }

    /// Appends the slot table and trailer, fsyncs, and returns the final
    /// file size.
    pub(crate) fn close(mut self) -> Result<u64> {
        let table_offset = self.size;
        let count = self.entry_offsets.len() as u64;
        let finish = |w: &mut Self| -> io::Result<()> {
            for i in 0..w.entry_offsets.len() {
                let off = w.entry_offsets[i];
                w.file.write_u64::<LittleEndian>(off)?;
            }
            w.file.write_u64::<LittleEndian>(table_offset)?;
            w.file.write_u64::<LittleEndian>(count)?;
            w.file.write_u32::<LittleEndian>(FLAT_INDEX_MAGIC)?;
            w.file.flush()?;
            w.file.get_ref().sync_all()
        };
        finish(&mut self).map_err(|e| Error::io(&self.path, e))?;
        Ok(table_offset + count * 8 + TRAILER_BYTES)
    }
}

/// The Binary strategy: no resident index at all. Every query binary
/// searches the slot table on disk through one mutex-guarded handle.
pub(crate) struct BinaryIndex {
    file: Mutex<BufReader<File>>,
    path: PathBuf,
    cmp: Arc<dyn Comparator>,
    table_offset: u64,
    count: u64,
}

impl BinaryIndex {
    pub(crate) fn open(path: &Path, cmp: Arc<dyn Comparator>) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let file_len = file.metadata().map_err(|e| Error::io(path, e))?.len();
        let mut rdr = BufReader::new(file);

        if file_len < HEADER_BYTES + TRAILER_BYTES {
            return Err(Error::CorruptTable("flat index file too small".into()));
        }

        let mut header = [0u8; HEADER_BYTES as usize];
        rdr.read_exact(&mut header).map_err(|e| Error::io(path, e))?;
        if u32::from_le_bytes([header[0], header[1], header[2], header[3]]) != FLAT_INDEX_MAGIC {
            return Err(Error::CorruptTable(
                "index file is not a flat binary index (bad magic); \
                 was the table written with IndexFormat::FlatBinary?"
                    .into(),
            ));
        }
        if header[4] != FLAT_INDEX_VERSION {
            return Err(Error::UnsupportedVersion {
                found: u32::from(header[4]),
                max: u32::from(FLAT_INDEX_VERSION),
            });
        }

        rdr.seek(SeekFrom::Start(file_len - TRAILER_BYTES))
            .map_err(|e| Error::io(path, e))?;
        let table_offset = rdr
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::io(path, e))?;
        let count = rdr
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::io(path, e))?;
        let trailer_magic = rdr
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::io(path, e))?;

        if trailer_magic != FLAT_INDEX_MAGIC {
            return Err(Error::CorruptTable("flat index trailer magic mismatch".into()));
        }
        // the slot table must sit exactly between the entries and the trailer
        let expected_end = table_offset
            .checked_add(count.checked_mul(8).ok_or_else(corrupt_geometry)?)
            .ok_or_else(corrupt_geometry)?
            + TRAILER_BYTES;
        if table_offset < HEADER_BYTES || expected_end != file_len {
            return Err(corrupt_geometry());
        }

        Ok(Self {
            file: Mutex::new(rdr),
            path: path.to_path_buf(),
            cmp,
            table_offset,
            count,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, BufReader<File>>> {
        self.file.lock().map_err(|e| {
            Error::io(
                &self.path,
                io::Error::new(io::ErrorKind::Other, format!("lock poisoned: {e}")),
            )
        })
    }

    /// Reads the entry behind slot `slot` (two seeks: slot, then entry).
    fn read_entry(&self, rdr: &mut BufReader<File>, slot: u64) -> Result<IndexEntry> {
        let io_err = |e| Error::io(&self.path, e);

        rdr.seek(SeekFrom::Start(self.table_offset + slot * 8))
            .map_err(io_err)?;
        let entry_offset = rdr.read_u64::<LittleEndian>().map_err(io_err)?;
        if entry_offset < HEADER_BYTES || entry_offset >= self.table_offset {
            return Err(Error::CorruptTable(format!(
                "flat index slot {slot} points outside the entry section"
            )));
        }

        rdr.seek(SeekFrom::Start(entry_offset)).map_err(io_err)?;
        let key_len = rdr.read_u32::<LittleEndian>().map_err(io_err)? as usize;
        if key_len > MAX_KEY_BYTES {
            return Err(Error::CorruptTable(format!(
                "corrupt flat index: key_len {key_len} exceeds maximum {MAX_KEY_BYTES}"
            )));
        }
        let mut key = vec![0u8; key_len];
        rdr.read_exact(&mut key).map_err(io_err)?;
        let value_offset = rdr.read_u64::<LittleEndian>().map_err(io_err)?;
        let checksum = rdr.read_u64::<LittleEndian>().map_err(io_err)?;

        Ok(IndexEntry {
            key,
            value_offset,
            checksum,
        })
    }

    /// First slot whose key is >= `key` (may be `count`).
    fn lower_bound(&self, rdr: &mut BufReader<File>, key: &[u8]) -> Result<u64> {
        let (mut lo, mut hi) = (0u64, self.count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = self.read_entry(rdr, mid)?;
            if self.cmp.compare(&entry.key, key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }
}

fn corrupt_geometry() -> Error {
    Error::CorruptTable("flat index slot table does not line up with the file size".into())
}

impl TableIndex for BinaryIndex {
    fn find_exact(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let mut rdr = self.lock()?;
        let slot = self.lower_bound(&mut rdr, key)?;
        if slot == self.count {
            return Ok(None);
        }
        let entry = self.read_entry(&mut rdr, slot)?;
        Ok((self.cmp.compare(&entry.key, key) == Ordering::Equal).then_some(entry))
    }

    fn find_floor(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let mut rdr = self.lock()?;
        let slot = self.lower_bound(&mut rdr, key)?;
        if slot < self.count {
            let entry = self.read_entry(&mut rdr, slot)?;
            if self.cmp.compare(&entry.key, key) == Ordering::Equal {
                return Ok(Some(entry));
            }
        }
        match slot.checked_sub(1) {
            Some(prev) => Ok(Some(self.read_entry(&mut rdr, prev)?)),
            None => Ok(None),
        }
    }

    fn find_ceil(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let mut rdr = self.lock()?;
        let slot = self.lower_bound(&mut rdr, key)?;
        if slot == self.count {
            return Ok(None);
        }
        Ok(Some(self.read_entry(&mut rdr, slot)?))
    }

    fn iter_range<'a>(
        &'a self,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Box<dyn IndexIterator + 'a>> {
        let mut rdr = self.lock()?;
        let start = match lo {
            Some(k) => self.lower_bound(&mut rdr, k)?,
            None => 0,
        };
        let end = match hi {
            Some(k) => self.lower_bound(&mut rdr, k)?,
            None => self.count,
        };
        drop(rdr);
        Ok(Box::new(BinaryIter {
            index: self,
            cur: start,
            end: end.max(start),
        }))
    }
}

struct BinaryIter<'a> {
    index: &'a BinaryIndex,
    cur: u64,
    end: u64,
}

impl IndexIterator for BinaryIter<'_> {
    fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        if self.cur >= self.end {
            return Ok(None);
        }
        let mut rdr = self.index.lock()?;
        let entry = self.index.read_entry(&mut rdr, self.cur)?;
        self.cur += 1;
        Ok(Some(entry))
    }
}
