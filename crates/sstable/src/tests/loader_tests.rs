use super::*;
use crate::index::TableIndex;
use crate::{
    DataLoader, Error, FixedWidthKeyMapper, IdentityKeyMapper, IndexFormat, IndexLoader,
    INDEX_FILE_NAME,
};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn sample_pairs(n: u32) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..n)
        .map(|i| {
            (
                format!("key-{:04}", i * 2).into_bytes(), // even keys only
                format!("value-{i}").into_bytes(),
            )
        })
        .collect()
}

fn write_sample(base: &Path, format: IndexFormat, n: u32) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let pairs = sample_pairs(n);
    let mut writer =
        SSTableStreamWriter::open(default_writer_options(base).index_format(format))?;
    for (key, value) in &pairs {
        writer.write_next(key, value)?;
    }
    writer.close()?;
    Ok(pairs)
}

/// Every strategy, each paired with the index format it can read.
fn all_loaders() -> Vec<(&'static str, IndexFormat, IndexLoader)> {
    vec![
        ("slice", IndexFormat::Recordio, IndexLoader::slice_key()),
        (
            "sorted_map",
            IndexFormat::Recordio,
            IndexLoader::sorted_map(Arc::new(IdentityKeyMapper)),
        ),
        ("skip_list", IndexFormat::Recordio, IndexLoader::skip_list()),
        ("binary", IndexFormat::FlatBinary, IndexLoader::binary()),
    ]
}

// -------------------- Cross-loader equivalence --------------------

#[test]
fn all_loaders_agree_on_scan_and_get() -> Result<()> {
    let mut reference: Option<Vec<(Vec<u8>, Vec<u8>)>> = None;

    for (name, format, loader) in all_loaders() {
        let dir = tempdir()?;
        let pairs = write_sample(dir.path(), format, 500)?;

        let reader =
            SSTableReader::open(default_reader_options(dir.path()).index_loader(loader))?;

        // full scans are byte-identical across strategies
        let scanned = collect_pairs(&reader);
        assert_eq!(scanned, pairs, "scan mismatch under {name}");
        match &reference {
            Some(r) => assert_eq!(&scanned, r, "loaders disagree under {name}"),
            None => reference = Some(scanned),
        }

        // present keys hit, absent keys (odd ones) miss
        for (key, value) in pairs.iter().step_by(37) {
            assert_eq!(reader.get(key)?.as_ref(), Some(value), "get mismatch under {name}");
        }
        assert_eq!(reader.get(b"key-0001")?, None, "phantom key under {name}");
        assert_eq!(reader.get(b"zzz")?, None, "phantom key under {name}");

        // bounded scans agree too
        let window: Vec<_> = reader
            .scan_range(Some(b"key-0100"), Some(b"key-0200"))?
            .collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(window.len(), 50, "window size mismatch under {name}");
        assert_eq!(window.first().unwrap().0, b"key-0100");
        assert_eq!(window.last().unwrap().0, b"key-0198");
    }

    Ok(())
}

// -------------------- Floor / ceil across strategies --------------------

#[test]
fn floor_and_ceil_agree_across_strategies() -> Result<()> {
    for (name, format, loader) in all_loaders() {
        let dir = tempdir()?;
        write_sample(dir.path(), format, 100)?; // keys key-0000, key-0002, ... key-0198

        let index: Box<dyn TableIndex> =
            loader.load(&dir.path().join(INDEX_FILE_NAME), bytewise())?;

        // exact hit
        let exact = index.find_exact(b"key-0100")?.expect("present key");
        assert_eq!(exact.key, b"key-0100");
        assert!(index.find_exact(b"key-0101")?.is_none());

        // floor/ceil on a key between two entries
        let floor = index.find_floor(b"key-0101")?.expect("floor exists");
        assert_eq!(floor.key, b"key-0100", "floor mismatch under {name}");
        let ceil = index.find_ceil(b"key-0101")?.expect("ceil exists");
        assert_eq!(ceil.key, b"key-0102", "ceil mismatch under {name}");

        // floor/ceil on an exact key return it
        assert_eq!(index.find_floor(b"key-0100")?.unwrap().key, b"key-0100");
        assert_eq!(index.find_ceil(b"key-0100")?.unwrap().key, b"key-0100");

        // off both ends
        assert!(index.find_floor(b"aaa")?.is_none(), "{name}");
        assert_eq!(index.find_ceil(b"aaa")?.unwrap().key, b"key-0000");
        assert_eq!(index.find_floor(b"zzz")?.unwrap().key, b"key-0198");
        assert!(index.find_ceil(b"zzz")?.is_none(), "{name}");
    }

    Ok(())
}

// -------------------- Mismatched loader / format --------------------

#[test]
fn binary_loader_refuses_recordio_index() -> Result<()> {
    let dir = tempdir()?;
    write_sample(dir.path(), IndexFormat::Recordio, 10)?;

    let err = SSTableReader::open(
        default_reader_options(dir.path()).index_loader(IndexLoader::binary()),
    )
    .unwrap_err();
    assert!(err.is_corruption(), "got {err:?}");

    Ok(())
}

#[test]
fn in_memory_loaders_refuse_flat_binary_index() -> Result<()> {
    let dir = tempdir()?;
    write_sample(dir.path(), IndexFormat::FlatBinary, 10)?;

    for loader in [IndexLoader::slice_key(), IndexLoader::skip_list()] {
        let err = SSTableReader::open(
            default_reader_options(dir.path()).index_loader(loader),
        )
        .unwrap_err();
        assert!(
            matches!(&err, Error::Record(recordio::Error::CorruptFormat(_))),
            "got {err:?}"
        );
    }

    Ok(())
}

// -------------------- Key mappers --------------------

#[test]
fn fixed_width_mapper_on_uniform_keys() -> Result<()> {
    let dir = tempdir()?;
    let pairs = write_sample(dir.path(), IndexFormat::Recordio, 200)?;

    // all keys are exactly 8 bytes ("key-0000"), so clipping at 8 is the
    // identity and everything must behave as usual
    let reader = SSTableReader::open(default_reader_options(dir.path()).index_loader(
        IndexLoader::sorted_map(Arc::new(FixedWidthKeyMapper { width: 8 })),
    ))?;

    assert_eq!(collect_pairs(&reader), pairs);
    assert_eq!(reader.get(b"key-0002")?, Some(b"value-1".to_vec()));
    assert_eq!(reader.get(b"key-0003")?, None);

    Ok(())
}

// -------------------- Custom data loader --------------------

/// A data loader that tampers with every value it resolves.
struct TamperingLoader {
    inner: crate::RecordioDataLoader,
}

impl DataLoader for TamperingLoader {
    fn load(&self, entry: &crate::proto::IndexEntry) -> crate::Result<Vec<u8>> {
        let mut value = self.inner.load(entry)?;
        if let Some(first) = value.first_mut() {
            *first ^= 0xFF;
        }
        Ok(value)
    }
}

#[test]
fn checksum_verification_catches_bad_data_loader() -> Result<()> {
    let dir = tempdir()?;
    write_sample(dir.path(), IndexFormat::Recordio, 10)?;

    let tampering = TamperingLoader {
        inner: crate::RecordioDataLoader::open(dir.path().join(crate::DATA_FILE_NAME))?,
    };
    let reader = SSTableReader::open(
        default_reader_options(dir.path())
            .data_loader(Box::new(tampering))
            .skip_hash_check_on_load(true),
    )?;

    let err = reader.get(b"key-0000").unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { .. }), "got {err:?}");

    // and the open-time verification pass catches it as well
    let tampering = TamperingLoader {
        inner: crate::RecordioDataLoader::open(dir.path().join(crate::DATA_FILE_NAME))?,
    };
    let err = SSTableReader::open(
        default_reader_options(dir.path()).data_loader(Box::new(tampering)),
    )
    .unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { .. }), "got {err:?}");

    Ok(())
}
