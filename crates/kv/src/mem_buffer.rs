use crate::{KvError, KvIter, Result};
use std::collections::btree_map::{self, BTreeMap};
use std::ops::Bound;

/// An ordered staging area of writes.
///
/// Deletions are kept as entries with an empty value,
/// so that they shadow the key in whatever the buffer is layered over.
#[derive(Debug, Default, Clone)]
pub struct MemBuffer {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemBuffer {
    /// Returns the staged value for `key`, which is empty for a staged deletion.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if value.is_empty() {
            return Err(KvError::EmptyValue { key: key.to_vec() });
        }
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Stages a deletion of `key`.
    pub fn delete(&mut self, key: &[u8]) {
        self.entries.insert(key.to_vec(), Vec::new());
    }

    /// A raw cursor at the first staged key `>= key`, deletions included.
    pub fn seek(&self, key: &[u8]) -> MapIter<'_> {
        MapIter::new(self.entries.range::<[u8], _>((Bound::Included(key), Bound::Unbounded)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A [`KvIter`] over a range of a `BTreeMap<Vec<u8>, Vec<u8>>`.
pub struct MapIter<'a> {
    range: btree_map::Range<'a, Vec<u8>, Vec<u8>>,
    cur: Option<(&'a Vec<u8>, &'a Vec<u8>)>,
}

impl<'a> MapIter<'a> {
    pub fn new(mut range: btree_map::Range<'a, Vec<u8>, Vec<u8>>) -> Self {
        let cur = range.next();
        Self { range, cur }
    }
}

impl KvIter for MapIter<'_> {
    fn valid(&self) -> bool {
        self.cur.is_some()
    }

    fn key(&self) -> &[u8] {
        self.cur.map_or(&[][..], |(k, _)| k.as_slice())
    }

    fn value(&self) -> &[u8] {
        self.cur.map_or(&[][..], |(_, v)| v.as_slice())
    }

    fn next(&mut self) -> Result<()> {
        self.cur = self.range.next();
        Ok(())
    }
}
