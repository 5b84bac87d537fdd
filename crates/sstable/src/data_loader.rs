use std::path::Path;

use recordio::RandomAccessReader;

use crate::error::Result;
use crate::proto::IndexEntry;

/// Resolves an index entry into the value bytes it points at.
///
/// The default is [`RecordioDataLoader`], a direct `read_at` on the
/// table's recordio data file; the seam exists so readers with unusual
/// data placement (or tests) can substitute their own resolution.
pub trait DataLoader: Send + Sync {
    fn load(&self, entry: &IndexEntry) -> Result<Vec<u8>>;
}

/// The usual case: values live in the `data` recordio file at
/// `entry.value_offset`.
pub struct RecordioDataLoader {
    reader: RandomAccessReader,
}

impl RecordioDataLoader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: RandomAccessReader::open(path)?,
        })
    }
}

impl DataLoader for RecordioDataLoader {
    fn load(&self, entry: &IndexEntry) -> Result<Vec<u8>> {
        Ok(self.reader.read_at(entry.value_offset)?)
    }
}
