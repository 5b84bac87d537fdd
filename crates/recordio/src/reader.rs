use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use crate::{
    read_uvarint, Compression, Error, Result, FILE_HEADER_BYTES, FILE_MAGIC, FILE_VERSION,
    MAX_PAYLOAD_BYTES, RECORD_MAGIC,
};

/// Validates the 6-byte file header and returns the compression in effect.
fn read_file_header<R: Read>(r: &mut R) -> Result<Compression> {
    let mut hdr = [0u8; FILE_HEADER_BYTES as usize];
    r.read_exact(&mut hdr)
        .map_err(|_| Error::CorruptFormat("file too small for header".into()))?;
    if hdr[0..4] != FILE_MAGIC {
        return Err(Error::CorruptFormat(format!(
            "bad file magic {:02x?}",
            &hdr[0..4]
        )));
    }
    if hdr[4] != FILE_VERSION {
        return Err(Error::UnsupportedFormat(format!(
            "file version {} (this build reads {})",
            hdr[4], FILE_VERSION
        )));
    }
    Compression::from_code(hdr[5])?.ensure_supported()
}

/// Decodes one record frame starting at the reader's current position.
///
/// Returns `Ok(None)` on a clean end of stream, i.e. EOF exactly at a frame
/// boundary. EOF anywhere inside a frame is [`Error::CorruptRecord`].
/// `offset` is only used for error context.
fn read_record<R: Read>(r: &mut R, compression: Compression, offset: u64) -> Result<Option<Vec<u8>>> {
    let mut magic = [0u8; 1];
    match r.read_exact(&mut magic) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    }
    if magic[0] != RECORD_MAGIC {
        return Err(Error::corrupt_record(offset, "bad record magic"));
    }

    let truncated = |_| Error::corrupt_record(offset, "truncated record header");
    let uncompressed_len = read_uvarint(r).map_err(truncated)?;
    let compressed_len = read_uvarint(r).map_err(truncated)?;
    if uncompressed_len > MAX_PAYLOAD_BYTES || compressed_len > MAX_PAYLOAD_BYTES {
        return Err(Error::corrupt_record(
            offset,
            format!("payload length {uncompressed_len}/{compressed_len} exceeds maximum"),
        ));
    }
    let crc = r.read_u32::<LittleEndian>().map_err(truncated)?;

    let mut stored = vec![0u8; compressed_len as usize];
    r.read_exact(&mut stored)
        .map_err(|_| Error::corrupt_record(offset, "truncated record payload"))?;

    let mut hasher = Crc32::new();
    hasher.update(&stored);
    if hasher.finalize() != crc {
        return Err(Error::corrupt_record(offset, "payload checksum mismatch"));
    }

    let payload = match compression {
        Compression::None => {
            if compressed_len != uncompressed_len {
                return Err(Error::corrupt_record(
                    offset,
                    "length mismatch on uncompressed record",
                ));
            }
            stored
        }
        Compression::Snappy => snap::raw::Decoder::new()
            .decompress_vec(&stored)
            .map_err(|e| Error::corrupt_record(offset, format!("snappy: {e}")))?,
        other => return Err(Error::UnsupportedFormat(format!("compression {other:?}"))),
    };
    if payload.len() as u64 != uncompressed_len {
        return Err(Error::corrupt_record(
            offset,
            "decompressed length does not match header",
        ));
    }

    Ok(Some(payload))
}

/// Sequential recordio reader used by full-table scans.
#[derive(Debug)]
pub struct FileReader {
    rdr: BufReader<File>,
    compression: Compression,
    /// Offset of the next frame to be read, for error context.
    offset: u64,
}

impl FileReader {
    /// Opens the file and validates its header.
    pub fn open<P: AsRef<Path>>(path: P, read_buffer_size: usize) -> Result<Self> {
        let file = File::open(path)?;
        let mut rdr = BufReader::with_capacity(read_buffer_size.max(64), file);
        let compression = read_file_header(&mut rdr)?;
        Ok(Self {
            rdr,
            compression,
            offset: FILE_HEADER_BYTES,
        })
    }

    /// The compression the file was written with.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Reads the next record payload, or `None` once the file is exhausted.
    pub fn read_next(&mut self) -> Result<Option<Vec<u8>>> {
        match read_record(&mut self.rdr, self.compression, self.offset)? {
            Some(payload) => {
                self.offset = self.rdr.stream_position()?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }
}

/// Random-access recordio reader.
///
/// Holds one persistent file handle behind a mutex so
/// [`read_at`](RandomAccessReader::read_at) can be called through `&self`
/// from concurrent readers.
#[derive(Debug)]
pub struct RandomAccessReader {
    file: Mutex<BufReader<File>>,
    compression: Compression,
}

impl RandomAccessReader {
    /// Opens the file and validates its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut rdr = BufReader::new(file);
        let compression = read_file_header(&mut rdr)?;
        Ok(Self {
            file: Mutex::new(rdr),
            compression,
        })
    }

    /// Reads the record that starts at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<Vec<u8>> {
        if offset < FILE_HEADER_BYTES {
            return Err(Error::corrupt_record(offset, "offset inside file header"));
        }
        let mut f = self
            .file
            .lock()
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, format!("lock poisoned: {e}"))))?;
        f.seek(SeekFrom::Start(offset))?;
        match read_record(&mut *f, self.compression, offset)? {
            Some(payload) => Ok(payload),
            None => Err(Error::corrupt_record(offset, "no record at offset")),
        }
    }
}
