use std::path::Path;
use std::sync::Arc;

use skiplist::{Comparator, SkipListMap};

use super::{read_index_entries, IndexIterator, TableIndex};
use crate::error::Result;
use crate::proto::IndexEntry;

/// The SkipList strategy: entries in a [`SkipListMap`] built over the
/// table's comparator, so arbitrary key orders need no normalization.
pub(crate) struct SkipListIndex {
    map: SkipListMap<IndexEntry>,
}

impl SkipListIndex {
    pub(crate) fn load(
        path: &Path,
        cmp: Arc<dyn Comparator>,
        read_buffer_size: usize,
    ) -> Result<Self> {
        let mut map = SkipListMap::new(cmp);
        for entry in read_index_entries(path, read_buffer_size)? {
            map.insert(entry.key.clone(), entry);
        }
        Ok(Self { map })
    }
}

impl TableIndex for SkipListIndex {
    fn find_exact(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        Ok(self.map.get(key).cloned())
    }

    fn find_floor(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        Ok(self.map.floor(key).map(|(_, e)| e.clone()))
    }

    fn find_ceil(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        Ok(self.map.ceiling(key).map(|(_, e)| e.clone()))
    }

    fn iter_range<'a>(
        &'a self,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Box<dyn IndexIterator + 'a>> {
        Ok(Box::new(SkipIter {
            inner: self.map.range(lo, hi),
        }))
    }
}

struct SkipIter<'a> {
    inner: skiplist::Iter<'a, IndexEntry>,
}

impl IndexIterator for SkipIter<'_> {
    fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        Ok(self.inner.next().map(|(_, e)| e.clone()))
    }
}
