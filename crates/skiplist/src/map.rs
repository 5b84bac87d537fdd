use rand::Rng;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::Comparator;

/// Maximum tower height.
const MAX_HEIGHT: usize = 16;
/// Denominator for tower growth (a node reaches level l+1 with p = 1/4).
const BRANCHING: u32 = 4;
/// Arena index meaning "no node".
const NIL: usize = usize::MAX;

struct Node<V> {
    key: Vec<u8>,
    value: V,
    /// Forward links per level, `forward.len()` is the tower height.
    forward: Vec<usize>,
}

/// A sorted map over byte keys and a caller-supplied [`Comparator`].
///
/// Nodes live in an arena (`Vec<Node>`) and link by index, so the structure
/// is plain safe code; the single-writer model of the engine never needs
/// lock-free towers. Insertion with an existing key replaces the value.
pub struct SkipListMap<V> {
    cmp: Arc<dyn Comparator>,
    nodes: Vec<Node<V>>,
    /// Head forward links per level.
    head: [usize; MAX_HEIGHT],
    /// Highest level currently in use (1..=MAX_HEIGHT).
    level: usize,
    len: usize,
}

impl<V> SkipListMap<V> {
    #[must_use]
    pub fn new(cmp: Arc<dyn Comparator>) -> Self {
        Self {
            cmp,
            nodes: Vec::new(),
            head: [NIL; MAX_HEIGHT],
            level: 1,
            len: 0,
        }
    }

    /// The comparator this map orders by.
    #[must_use]
    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.cmp
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn next_of(&self, node: Option<usize>, level: usize) -> usize {
        match node {
            None => self.head[level],
            Some(i) => self.nodes[i].forward[level],
        }
    }

    /// Walks down the towers; returns the per-level predecessors of `key`
    /// (None meaning the head).
    fn predecessors(&self, key: &[u8]) -> [Option<usize>; MAX_HEIGHT] {
        let mut update: [Option<usize>; MAX_HEIGHT] = [None; MAX_HEIGHT];
        let mut cur: Option<usize> = None;
        for l in (0..self.level).rev() {
            loop {
                let next = self.next_of(cur, l);
                if next == NIL {
                    break;
                }
                match self.cmp.compare(&self.nodes[next].key, key) {
                    Ordering::Less => cur = Some(next),
                    _ => break,
                }
            }
            update[l] = cur;
        }
        update
    }

    /// Index of the first node with key >= `key`, or NIL.
    fn ceiling_node(&self, key: &[u8]) -> usize {
        let update = self.predecessors(key);
        self.next_of(update[0], 0)
    }

    /// Inserts `key`, replacing and returning the previous value if the key
    /// already exists.
    pub fn insert(&mut self, key: Vec<u8>, value: V) -> Option<V> {
        let mut update = self.predecessors(&key);

        let candidate = self.next_of(update[0], 0);
        if candidate != NIL && self.cmp.compare(&self.nodes[candidate].key, &key) == Ordering::Equal
        {
            return Some(std::mem::replace(&mut self.nodes[candidate].value, value));
        }

        let height = random_height();
        if height > self.level {
            for slot in update.iter_mut().take(height).skip(self.level) {
                *slot = None;
            }
            self.level = height;
        }

        let idx = self.nodes.len();
        let mut forward = vec![NIL; height];
        for (l, link) in forward.iter_mut().enumerate() {
            *link = self.next_of(update[l], l);
        }
        self.nodes.push(Node {
            key,
            value,
            forward,
        });
        for (l, pred) in update.iter().enumerate().take(height) {
            match pred {
                None => self.head[l] = idx,
                Some(p) => self.nodes[*p].forward[l] = idx,
            }
        }
        self.len += 1;
        None
    }

    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let idx = self.ceiling_node(key);
        if idx != NIL && self.cmp.compare(&self.nodes[idx].key, key) == Ordering::Equal {
            Some(&self.nodes[idx].value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Smallest entry with key >= `key`.
    #[must_use]
    pub fn ceiling(&self, key: &[u8]) -> Option<(&[u8], &V)> {
        let idx = self.ceiling_node(key);
        if idx == NIL {
            None
        } else {
            let node = &self.nodes[idx];
            Some((node.key.as_slice(), &node.value))
        }
    }

    /// Largest entry with key <= `key`.
    #[must_use]
    pub fn floor(&self, key: &[u8]) -> Option<(&[u8], &V)> {
        let update = self.predecessors(key);
        let candidate = self.next_of(update[0], 0);
        if candidate != NIL
            && self.cmp.compare(&self.nodes[candidate].key, key) == Ordering::Equal
        {
            let node = &self.nodes[candidate];
            return Some((node.key.as_slice(), &node.value));
        }
        let idx = update[0]?;
        let node = &self.nodes[idx];
        Some((node.key.as_slice(), &node.value))
    }

    /// Ordered iterator over all entries.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            list: self,
            cur: self.head[0],
            upper: None,
        }
    }

    /// Ordered iterator over `[lo, hi)`; `None` means unbounded.
    #[must_use]
    pub fn range(&self, lo: Option<&[u8]>, hi: Option<&[u8]>) -> Iter<'_, V> {
        let cur = match lo {
            Some(lo) => self.ceiling_node(lo),
            None => self.head[0],
        };
        Iter {
            list: self,
            cur,
            upper: hi.map(|h| h.to_vec()),
        }
    }
}

/// Borrowing in-order iterator, optionally bounded by an exclusive upper key.
pub struct Iter<'a, V> {
    list: &'a SkipListMap<V>,
    cur: usize,
    upper: Option<Vec<u8>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur == NIL {
            return None;
        }
        let list = self.list;
        let node = &list.nodes[self.cur];
        if let Some(upper) = &self.upper {
            if list.cmp.compare(&node.key, upper) != Ordering::Less {
                self.cur = NIL;
                return None;
            }
        }
        self.cur = node.forward[0];
        Some((node.key.as_slice(), &node.value))
    }
}

fn random_height() -> usize {
    let mut height = 1;
    let mut rng = rand::thread_rng();
    while height < MAX_HEIGHT && rng.gen_ratio(1, BRANCHING) {
        height += 1;
    }
    height
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BytewiseComparator;
    use std::collections::BTreeMap;

    fn new_map() -> SkipListMap<u64> {
        SkipListMap::new(Arc::new(BytewiseComparator))
    }

    #[test]
    fn empty_map() {
        let m = new_map();
        assert_eq!(m.len(), 0);
        assert!(m.is_empty());
        assert!(m.get(b"a").is_none());
        assert!(m.ceiling(b"a").is_none());
        assert!(m.floor(b"a").is_none());
        assert!(m.iter().next().is_none());
    }

    #[test]
    fn insert_get_replace() {
        let mut m = new_map();
        assert_eq!(m.insert(b"k".to_vec(), 1), None);
        assert_eq!(m.get(b"k"), Some(&1));
        assert_eq!(m.insert(b"k".to_vec(), 2), Some(1));
        assert_eq!(m.get(b"k"), Some(&2));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn iteration_is_sorted_regardless_of_insert_order() {
        let mut m = new_map();
        for (i, key) in ["m", "a", "z", "c", "q", "b"].iter().enumerate() {
            m.insert(key.as_bytes().to_vec(), i as u64);
        }
        let keys: Vec<&[u8]> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                b"a".as_slice(),
                b"b".as_slice(),
                b"c".as_slice(),
                b"m".as_slice(),
                b"q".as_slice(),
                b"z".as_slice()
            ]
        );
    }

    #[test]
    fn floor_and_ceiling() {
        let mut m = new_map();
        for key in ["b", "d", "f"] {
            m.insert(key.as_bytes().to_vec(), 0);
        }

        assert_eq!(m.ceiling(b"a").unwrap().0, b"b");
        assert_eq!(m.ceiling(b"b").unwrap().0, b"b");
        assert_eq!(m.ceiling(b"c").unwrap().0, b"d");
        assert!(m.ceiling(b"g").is_none());

        assert!(m.floor(b"a").is_none());
        assert_eq!(m.floor(b"b").unwrap().0, b"b");
        assert_eq!(m.floor(b"c").unwrap().0, b"b");
        assert_eq!(m.floor(b"g").unwrap().0, b"f");
    }

    #[test]
    fn range_bounds_are_half_open() {
        let mut m = new_map();
        for i in 0..10u8 {
            m.insert(vec![b'0' + i], u64::from(i));
        }

        let keys: Vec<&[u8]> = m.range(Some(b"3"), Some(b"7")).map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"3".as_slice(), b"4".as_slice(), b"5".as_slice(), b"6".as_slice()]);

        // unbounded sides
        assert_eq!(m.range(None, Some(b"2")).count(), 2);
        assert_eq!(m.range(Some(b"8"), None).count(), 2);
        assert_eq!(m.range(None, None).count(), 10);

        // empty range
        assert_eq!(m.range(Some(b"7"), Some(b"7")).count(), 0);
    }

    #[test]
    fn matches_btreemap_reference_model() {
        use rand::prelude::*;

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut model = BTreeMap::new();
        let mut m = new_map();

        for _ in 0..2000 {
            let key: Vec<u8> = (0..rng.gen_range(1..8)).map(|_| rng.gen_range(b'a'..=b'f')).collect();
            let value: u64 = rng.gen();
            model.insert(key.clone(), value);
            m.insert(key, value);
        }

        assert_eq!(m.len(), model.len());
        let got: Vec<(Vec<u8>, u64)> = m.iter().map(|(k, v)| (k.to_vec(), *v)).collect();
        let want: Vec<(Vec<u8>, u64)> = model.iter().map(|(k, v)| (k.clone(), *v)).collect();
        assert_eq!(got, want);

        for probe in [b"a".to_vec(), b"cc".to_vec(), b"fff".to_vec(), b"zz".to_vec()] {
            assert_eq!(m.get(&probe), model.get(&probe));
            let want_ceil = model.range(probe.clone()..).next().map(|(k, _)| k.clone());
            assert_eq!(m.ceiling(&probe).map(|(k, _)| k.to_vec()), want_ceil);
            let want_floor = model.range(..=probe.clone()).next_back().map(|(k, _)| k.clone());
            assert_eq!(m.floor(&probe).map(|(k, _)| k.to_vec()), want_floor);
        }
    }
}
