use super::*;
use anyhow::Result;
use sstable::{ReaderOptions, SSTableReader};
use tempfile::tempdir;

// -------------------- Buffer semantics --------------------

#[test]
fn add_get_contains() {
    let mut store = MemStore::new();
    store.add(b"k1", b"v1").unwrap();

    assert_eq!(store.get(b"k1"), Some(b"v1".as_slice()));
    assert!(store.contains(b"k1"));
    assert!(!store.contains(b"nope"));
    assert_eq!(store.len(), 1);
}

#[test]
fn add_existing_key_fails() {
    let mut store = MemStore::new();
    store.add(b"k", b"v").unwrap();
    assert_eq!(store.add(b"k", b"w"), Err(MemStoreError::KeyAlreadyExists));
    // tombstoned still counts as present
    store.delete(b"k").unwrap();
    assert_eq!(store.add(b"k", b"w"), Err(MemStoreError::KeyAlreadyExists));
}

#[test]
fn upsert_replaces() {
    let mut store = MemStore::new();
    store.upsert(b"k", b"v1");
    store.upsert(b"k", b"v2");
    assert_eq!(store.get(b"k"), Some(b"v2".as_slice()));
    assert_eq!(store.len(), 1);
}

#[test]
fn delete_semantics() {
    let mut store = MemStore::new();
    assert_eq!(store.delete(b"missing"), Err(MemStoreError::KeyNotFound));
    store.delete_if_exists(b"missing"); // no error, leaves a tombstone

    store.add(b"k", b"v").unwrap();
    store.delete(b"k").unwrap();
    assert_eq!(store.get(b"k"), None);
    assert!(!store.contains(b"k"));
    // the tombstone is still a cell
    assert_eq!(store.len(), 2);
}

#[test]
fn estimated_size_tracks_values() {
    let mut store = MemStore::new();
    assert_eq!(store.estimated_size_bytes(), 0);
    store.add(b"a", b"aaa").unwrap(); // 1 + 3
    assert_eq!(store.estimated_size_bytes(), 4);
    store.upsert(b"a", b"bb"); // value shrinks by one
    assert_eq!(store.estimated_size_bytes(), 3);
    store.delete(b"a").unwrap(); // key remains as tombstone
    assert_eq!(store.estimated_size_bytes(), 1);
}

#[test]
fn iter_is_sorted_and_includes_tombstones() {
    let mut store = MemStore::new();
    store.add(b"c", b"3").unwrap();
    store.add(b"a", b"1").unwrap();
    store.delete_if_exists(b"b");

    let cells: Vec<(&[u8], Option<&[u8]>)> = store.iter().collect();
    assert_eq!(
        cells,
        vec![
            (b"a".as_slice(), Some(b"1".as_slice())),
            (b"b".as_slice(), None),
            (b"c".as_slice(), Some(b"3".as_slice())),
        ]
    );
}

// -------------------- Flush --------------------

#[test]
fn flush_then_read_back() -> Result<()> {
    let dir = tempdir()?;
    let cmp: Arc<dyn Comparator> = Arc::new(BytewiseComparator);

    let mut store = MemStore::new();
    for i in 0..100u32 {
        store.add(format!("key-{i:03}").as_bytes(), format!("val-{i}").as_bytes())?;
    }
    store.flush(
        WriterOptions::new()
            .base_path(dir.path())
            .key_comparator(Arc::clone(&cmp)),
    )?;

    let reader = SSTableReader::open(
        ReaderOptions::new()
            .base_path(dir.path())
            .key_comparator(cmp),
    )?;
    assert_eq!(reader.metadata().num_records, 100);
    assert_eq!(
        reader.get(b"key-042")?,
        Some(b"val-42".to_vec()),
    );

    let pairs: Vec<(Vec<u8>, Vec<u8>)> =
        reader.scan()?.collect::<sstable::Result<_>>()?;
    assert_eq!(pairs.len(), 100);
    assert_eq!(pairs[0].0, b"key-000");

    Ok(())
}

#[test]
fn flush_writes_tombstones_as_null_values() -> Result<()> {
    let dir = tempdir()?;
    let cmp: Arc<dyn Comparator> = Arc::new(BytewiseComparator);

    let mut store = MemStore::new();
    store.add(b"alive", b"value")?;
    store.add(b"dead", b"value")?;
    store.delete(b"dead")?;
    store.flush(
        WriterOptions::new()
            .base_path(dir.path())
            .key_comparator(Arc::clone(&cmp)),
    )?;

    let reader = SSTableReader::open(
        ReaderOptions::new()
            .base_path(dir.path())
            .key_comparator(cmp),
    )?;
    assert_eq!(reader.metadata().num_records, 2);
    assert_eq!(reader.metadata().null_values, 1);
    assert_eq!(reader.get(b"alive")?, Some(b"value".to_vec()));
    // tombstones surface as present-but-empty; interpretation is the
    // caller's business
    assert_eq!(reader.get(b"dead")?, Some(Vec::new()));

    Ok(())
}

#[test]
fn flush_empty_store_produces_readable_empty_table() -> Result<()> {
    let dir = tempdir()?;
    let cmp: Arc<dyn Comparator> = Arc::new(BytewiseComparator);

    MemStore::new().flush(
        WriterOptions::new()
            .base_path(dir.path())
            .key_comparator(Arc::clone(&cmp)),
    )?;

    let reader = SSTableReader::open(
        ReaderOptions::new()
            .base_path(dir.path())
            .key_comparator(cmp),
    )?;
    assert_eq!(reader.metadata().num_records, 0);
    assert!(reader.metadata().min_key.is_empty());
    assert!(reader.metadata().max_key.is_empty());
    assert_eq!(reader.get(b"anything")?, None);
    assert_eq!(reader.scan()?.count(), 0);

    Ok(())
}
