mod loader_tests;

use std::path::Path;
use std::sync::Arc;

use crate::{
    BytewiseComparator, Comparator, ReaderOptions, Result, SSTableReader, SSTableStreamWriter,
    WriterOptions,
};

pub(crate) fn bytewise() -> Arc<dyn Comparator> {
    Arc::new(BytewiseComparator)
}

pub(crate) fn default_writer_options(base: &Path) -> WriterOptions {
    WriterOptions::new()
        .base_path(base)
        .key_comparator(bytewise())
}

pub(crate) fn default_reader_options(base: &Path) -> ReaderOptions {
    ReaderOptions::new()
        .base_path(base)
        .key_comparator(bytewise())
}

/// Writes `pairs` (already sorted) into a table at `base` with the given
/// options.
pub(crate) fn write_table_with(
    options: WriterOptions,
    pairs: &[(&[u8], &[u8])],
) -> Result<()> {
    let mut writer = SSTableStreamWriter::open(options)?;
    for (key, value) in pairs {
        writer.write_next(key, value)?;
    }
    writer.close()
}

pub(crate) fn write_table(base: &Path, pairs: &[(&[u8], &[u8])]) -> Result<()> {
    write_table_with(default_writer_options(base), pairs)
}

pub(crate) fn open_table(base: &Path) -> Result<SSTableReader> {
    SSTableReader::open(default_reader_options(base))
}

/// Drains a scanner into owned pairs, failing the test on any error.
pub(crate) fn collect_pairs(reader: &SSTableReader) -> Vec<(Vec<u8>, Vec<u8>)> {
    reader
        .scan()
        .expect("scan should start")
        .collect::<Result<Vec<_>>>()
        .expect("scan should not error")
}
