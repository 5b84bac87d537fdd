use crate::{Compression, FileReader, FileWriter, RandomAccessReader, FILE_HEADER_BYTES};
use anyhow::Result;
use tempfile::tempdir;

// -------------------- Append / offsets --------------------

#[test]
fn first_record_starts_after_header() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("log");

    let mut w = FileWriter::open(&path, Compression::None, 4096)?;
    let offset = w.append(b"hello")?;
    assert_eq!(offset, FILE_HEADER_BYTES);
    w.close()?;

    Ok(())
}

#[test]
fn offsets_are_strictly_increasing() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("log");

    let mut w = FileWriter::open(&path, Compression::None, 4096)?;
    let mut last = 0;
    for i in 0..100u32 {
        let offset = w.append(format!("payload-{i}").as_bytes())?;
        assert!(offset > last || i == 0, "offset {offset} not increasing");
        last = offset;
    }
    assert_eq!(w.size(), {
        // every payload fits in one varint byte per length field:
        // 1 magic + 1 + 1 + 4 crc + payload
        let bodies: u64 = (0..100u32).map(|i| format!("payload-{i}").len() as u64).sum();
        FILE_HEADER_BYTES + 100 * 7 + bodies
    });
    w.close()?;

    Ok(())
}

#[test]
fn close_reports_final_size() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("log");

    let mut w = FileWriter::open(&path, Compression::None, 4096)?;
    w.append(b"abc")?;
    let size = w.size();
    let closed = w.close()?;
    assert_eq!(size, closed);
    assert_eq!(std::fs::metadata(&path)?.len(), closed);

    Ok(())
}

// -------------------- Seek (rollback) --------------------

#[test]
fn seek_truncates_back_to_offset() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("log");

    let mut w = FileWriter::open(&path, Compression::None, 4096)?;
    w.append(b"keep-me")?;
    let rollback_to = w.size();
    w.append(b"discard-me")?;
    assert!(w.size() > rollback_to);

    w.seek(rollback_to)?;
    assert_eq!(w.size(), rollback_to);

    // the file stays appendable after a rollback
    w.append(b"replacement")?;
    w.close()?;

    let mut r = FileReader::open(&path, 4096)?;
    assert_eq!(r.read_next()?.unwrap(), b"keep-me");
    assert_eq!(r.read_next()?.unwrap(), b"replacement");
    assert!(r.read_next()?.is_none());

    Ok(())
}

#[test]
fn seek_forward_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("log");

    let mut w = FileWriter::open(&path, Compression::None, 4096)?;
    w.append(b"x")?;
    assert!(w.seek(w.size() + 10).is_err());

    Ok(())
}

// -------------------- Compression --------------------

#[test]
fn snappy_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("log");

    // repetitive payload, so snappy actually shrinks it
    let payload = vec![b'a'; 100_000];

    let mut w = FileWriter::open(&path, Compression::Snappy, 4096)?;
    let offset = w.append(&payload)?;
    let size = w.close()?;
    assert!(size < payload.len() as u64, "snappy should compress {size}");

    let r = RandomAccessReader::open(&path)?;
    assert_eq!(r.read_at(offset)?, payload);

    Ok(())
}

#[test]
fn empty_payload_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    for compression in [Compression::None, Compression::Snappy] {
        let path = dir.path().join(format!("log-{:?}", compression));
        let mut w = FileWriter::open(&path, compression, 4096)?;
        let offset = w.append(b"")?;
        w.close()?;

        let r = RandomAccessReader::open(&path)?;
        assert_eq!(r.read_at(offset)?, Vec::<u8>::new());
    }

    Ok(())
}

#[test]
fn reserved_compression_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log");
    assert!(FileWriter::open(&path, Compression::Gzip, 4096).is_err());
    assert!(FileWriter::open(&path, Compression::Lz4, 4096).is_err());
}
