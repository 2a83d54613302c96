use crate::{KvIter, Result};
use core::cmp::Ordering;

/// Overlays a dirty iterator (staged writes, where an empty value is a deletion)
/// on top of a snapshot iterator.
///
/// On equal keys the dirty entry wins; staged deletions hide the snapshot entry
/// and are never yielded.
pub struct UnionIter<'a> {
    dirty: Box<dyn KvIter + 'a>,
    snapshot: Box<dyn KvIter + 'a>,
    dirty_valid: bool,
    snapshot_valid: bool,
    cur_is_dirty: bool,
    is_valid: bool,
}

impl<'a> UnionIter<'a> {
    pub fn new(dirty: Box<dyn KvIter + 'a>, snapshot: Box<dyn KvIter + 'a>) -> Result<Self> {
        let mut it = Self {
            dirty_valid: dirty.valid(),
            snapshot_valid: snapshot.valid(),
            dirty,
            snapshot,
            cur_is_dirty: false,
            is_valid: true,
        };
        it.update_cur()?;
        Ok(it)
    }

    fn dirty_next(&mut self) -> Result<()> {
        self.dirty.next()?;
        self.dirty_valid = self.dirty.valid();
        Ok(())
    }

    fn snapshot_next(&mut self) -> Result<()> {
        self.snapshot.next()?;
        self.snapshot_valid = self.snapshot.valid();
        Ok(())
    }

    /// Positions the union on the next visible entry.
    fn update_cur(&mut self) -> Result<()> {
        self.is_valid = true;
        loop {
            match (self.dirty_valid, self.snapshot_valid) {
                (false, false) => {
                    self.is_valid = false;
                    return Ok(());
                }
                (false, true) => {
                    self.cur_is_dirty = false;
                    return Ok(());
                }
                (true, false) => {
                    if self.dirty.value().is_empty() {
                        self.dirty_next()?;
                        continue;
                    }
                    self.cur_is_dirty = true;
                    return Ok(());
                }
                (true, true) => match self.dirty.key().cmp(self.snapshot.key()) {
                    Ordering::Equal => {
                        // The dirty entry shadows the snapshot entry either way.
                        self.snapshot_next()?;
                        if self.dirty.value().is_empty() {
                            self.dirty_next()?;
                            continue;
                        }
                        self.cur_is_dirty = true;
                        return Ok(());
                    }
                    Ordering::Greater => {
                        self.cur_is_dirty = false;
                        return Ok(());
                    }
                    Ordering::Less => {
                        if self.dirty.value().is_empty() {
                            self.dirty_next()?;
                            continue;
                        }
                        self.cur_is_dirty = true;
                        return Ok(());
                    }
                },
            }
        }
    }
}

impl KvIter for UnionIter<'_> {
    fn valid(&self) -> bool {
        self.is_valid
    }

    fn key(&self) -> &[u8] {
        if self.cur_is_dirty {
            self.dirty.key()
        } else {
            self.snapshot.key()
        }
    }

    fn value(&self) -> &[u8] {
        if self.cur_is_dirty {
            self.dirty.value()
        } else {
            self.snapshot.value()
        }
    }

    fn next(&mut self) -> Result<()> {
        if self.cur_is_dirty {
            self.dirty_next()?;
        } else {
            self.snapshot_next()?;
        }
        self.update_cur()
    }
}
