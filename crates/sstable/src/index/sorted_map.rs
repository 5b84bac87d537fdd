use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use super::{read_index_entries, IndexIterator, KeyMapper, TableIndex};
use crate::error::Result;
use crate::proto::IndexEntry;

/// The SortedMap strategy: a `BTreeMap` keyed by the mapper-normalized
/// key. Works because the mapper's output byte order matches the table's
/// comparator order (see [`KeyMapper`]).
pub(crate) struct SortedMapIndex {
    map: BTreeMap<Vec<u8>, IndexEntry>,
    mapper: Arc<dyn KeyMapper>,
}

impl SortedMapIndex {
    pub(crate) fn load(
        path: &Path,
        mapper: Arc<dyn KeyMapper>,
        read_buffer_size: usize,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in read_index_entries(path, read_buffer_size)? {
            map.insert(mapper.map(&entry.key), entry);
        }
        Ok(Self { map, mapper })
    }
}

impl TableIndex for SortedMapIndex {
    fn find_exact(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        Ok(self.map.get(&self.mapper.map(key)).cloned())
    }

    fn find_floor(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let mapped = self.mapper.map(key);
        Ok(self
            .map
            .range(..=mapped)
            .next_back()
            .map(|(_, e)| e.clone()))
    }

    fn find_ceil(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let mapped = self.mapper.map(key);
        Ok(self
            .map
            .range((Bound::Included(mapped), Bound::Unbounded))
            .next()
            .map(|(_, e)| e.clone()))
    }

    fn iter_range<'a>(
        &'a self,
        lo: Option<&[u8]>,
        hi: Option<&[u8]>,
    ) -> Result<Box<dyn IndexIterator + 'a>> {
        let lo = match lo {
            Some(k) => Bound::Included(self.mapper.map(k)),
            None => Bound::Unbounded,
        };
        let hi = match hi {
            Some(k) => Bound::Excluded(self.mapper.map(k)),
            None => Bound::Unbounded,
        };
        Ok(Box::new(MapIter {
            inner: self.map.range((lo, hi)),
        }))
    }
}

struct MapIter<'a> {
    inner: std::collections::btree_map::Range<'a, Vec<u8>, IndexEntry>,
}

impl IndexIterator for MapIter<'_> {
    fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        Ok(self.inner.next().map(|(_, e)| e.clone()))
    }
}
