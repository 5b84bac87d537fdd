use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{
    write_uvarint, Compression, Error, Result, FILE_HEADER_BYTES, FILE_MAGIC, FILE_VERSION,
    RECORD_MAGIC,
};

/// Appending recordio writer.
///
/// Every [`append`](FileWriter::append) frames one payload and returns the
/// record's starting offset, which is the random-access handle a
/// [`RandomAccessReader`](crate::RandomAccessReader) consumes later.
/// Writes go through a [`std::io::BufWriter`] sized by the caller;
/// [`close`](FileWriter::close) flushes and fsyncs.
pub struct FileWriter {
    file: io::BufWriter<File>,
    compression: Compression,
    /// Total bytes written so far, header included. Tracked here because the
    /// buffered file position lags behind.
    size: u64,
    /// Reusable frame-header scratch buffer.
    scratch: Vec<u8>,
}

impl FileWriter {
    /// Creates (truncating) the file at `path` and writes the file header.
    pub fn open<P: AsRef<Path>>(
        path: P,
        compression: Compression,
        write_buffer_size: usize,
    ) -> Result<Self> {
        compression.ensure_supported()?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut file = io::BufWriter::with_capacity(write_buffer_size.max(64), file);

        file.write_all(&FILE_MAGIC)?;
        file.write_u8(FILE_VERSION)?;
        file.write_u8(compression.code())?;

        Ok(Self {
            file,
            compression,
            size: FILE_HEADER_BYTES,
            scratch: Vec::with_capacity(32),
        })
    }

    /// Appends one record and returns its starting byte offset.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        let offset = self.size;

        let compressed;
        let stored: &[u8] = match self.compression {
            Compression::None => payload,
            Compression::Snappy => {
                compressed = snap::raw::Encoder::new()
                    .compress_vec(payload)
                    .map_err(|e| {
                        Error::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
                    })?;
                &compressed
            }
            // rejected in open()
            other => return Err(Error::UnsupportedFormat(format!("compression {other:?}"))),
        };

        let mut hasher = Crc32::new();
        hasher.update(stored);
        let crc = hasher.finalize();

        self.scratch.clear();
        self.scratch.push(RECORD_MAGIC);
        write_uvarint(&mut self.scratch, payload.len() as u64);
        write_uvarint(&mut self.scratch, stored.len() as u64);
        self.scratch.write_u32::<LittleEndian>(crc)?;

        self.file.write_all(&self.scratch)?;
        self.file.write_all(stored)?;
        self.size += self.scratch.len() as u64 + stored.len() as u64;

        Ok(offset)
    }

    /// Truncates the file back to `offset`, discarding everything appended
    /// after it. The SSTable writer uses this to roll back a data-side
    /// append whose matching index append failed.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.size {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot seek past end ({offset} > {})", self.size),
            )));
        }
        self.file.flush()?;
        let f = self.file.get_mut();
        f.set_len(offset)?;
        f.seek(SeekFrom::Start(offset))?;
        self.size = offset;
        Ok(())
    }

    /// Total bytes written so far, header included.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flushes buffered bytes, fsyncs, and returns the final file size.
    pub fn close(mut self) -> Result<u64> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(self.size)
    }
}
