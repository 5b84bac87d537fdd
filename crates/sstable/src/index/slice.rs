use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use skiplist::Comparator;

use super::{read_index_entries, IndexIterator, TableIndex};
use crate::error::Result;
use crate::proto::IndexEntry;

/// The SliceKey strategy: all entries in one sorted vector, looked up by
/// binary search under the table comparator.
pub(crate) struct SliceKeyIndex {
    entries: Vec<IndexEntry>,
    cmp: Arc<dyn Comparator>,
}

impl SliceKeyIndex {
    pub(crate) fn load(
        path: &Path,
        cmp: Arc<dyn Comparator>,
        read_buffer_size: usize,
    ) -> Result<Self> {
        let entries = read_index_entries(path, read_buffer_size)?;
        Ok(Self { entries, cmp })
    }

    /// Index of the first entry with key >= `key` (may be `len`).
    fn lower_bound(&self, key: &[u8]) -> usize {
        self.entries
            .partition_point(|e| self.cmp.compare(&e.key, key) == Ordering::Less)
    }
}

impl TableIndex for SliceKeyIndex {
    fn find_exact(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let idx = self.lower_bound(key);
        Ok(self
            .entries
            .get(idx)
            .filter(|e| self.cmp.compare(&e.key, key) == Ordering::Equal)
            .cloned())
    }

    fn find_floor(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        // first entry strictly greater than key, minus one
        let idx = self
            .entries
            .partition_point(|e| self.cmp.compare(&e.key, key) != Ordering::Greater);
        Ok(idx.checked_sub(1).map(|i| self.entries[i].clone()))
    }

    fn find_ceil(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        Ok(self.entries.get(self.lower_bound(key)).cloned())
    }

    fn iter_range<'a>(
        &'a self,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Box<dyn IndexIterator + 'a>> {
        let start = lo.map_or(0, |k| self.lower_bound(k));
        let end = hi.map_or(self.entries.len(), |k| self.lower_bound(k));
        let range = &self.entries[start..end.max(start)];
        Ok(Box::new(SliceIter {
            inner: range.iter(),
        }))
    }
}

struct SliceIter<'a> {
    inner: std::slice::Iter<'a, IndexEntry>,
}

impl IndexIterator for SliceIter<'_> {
    fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        Ok(self.inner.next().cloned())
    }
}
