use crate::error::TableError;
use crate::options::StorageOptions;
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tabula_primitives::TableId;

/// Issues row handles.
pub trait Allocator: Send + Sync {
    /// Returns the next handle of `table_id`, greater than every handle it returned before.
    fn alloc(&self, table_id: TableId) -> Result<i64>;

    /// Ensures later handles are greater than `new_base`.
    ///
    /// Used after a row is inserted with an explicit handle.
    /// When `allocate` is set, a new batch is reserved past `new_base` right away.
    /// Never moves the allocator backwards.
    fn rebase(&self, table_id: TableId, new_base: i64, allocate: bool) -> Result<()>;

    /// The last handle returned, or the rebased value.
    fn base(&self) -> i64;

    /// The end of the reserved batch.
    fn end(&self) -> i64;
}

/// The persisted high-water marks of every table, shared by allocators.
///
/// A handle is never issued twice as long as the marks outlive the allocators,
/// even if an allocator is dropped with part of its batch unused.
pub type AllocMarks = Arc<Mutex<HashMap<TableId, i64>>>;

#[derive(Debug, Default)]
struct Batch {
    /// The last handle returned.
    base: i64,
    /// The last handle reserved. No handle in `base + 1 ..= end` was returned yet.
    end: i64,
}

/// An [`Allocator`] reserving handles `step` at a time from shared high-water marks.
#[derive(Debug)]
pub struct MemAllocator {
    step: u64,
    marks: AllocMarks,
    batch: Mutex<Batch>,
}

impl MemAllocator {
    pub fn new(marks: AllocMarks, step: u64) -> Self {
        Self {
            step: step.max(1),
            marks,
            batch: Mutex::default(),
        }
    }

    pub fn with_options(marks: AllocMarks, options: &StorageOptions) -> Self {
        Self::new(marks, options.alloc_step)
    }

    /// Moves the mark of `table_id` up to at least `min_end` plus `extra` and returns it.
    fn reserve(&self, table_id: TableId, min_end: i64, extra: u64) -> Result<i64> {
        let mut marks = self.marks.lock();
        let mark = marks.entry(table_id).or_default();
        let extra = i64::try_from(extra).map_err(|_| TableError::AutoIdExhausted(table_id))?;
        let new_end = (*mark)
            .max(min_end)
            .checked_add(extra)
            .ok_or(TableError::AutoIdExhausted(table_id))?;
        *mark = new_end;
        Ok(new_end)
    }
}

impl Allocator for MemAllocator {
    fn alloc(&self, table_id: TableId) -> Result<i64> {
        let mut batch = self.batch.lock();
        if batch.base >= batch.end {
            let new_end = self.reserve(table_id, batch.base, self.step)?;
            log::trace!(
                "ALLOC BATCH: table_id = {table_id}, from = {}, to = {new_end}",
                new_end - self.step as i64
            );
            batch.base = new_end - self.step as i64;
            batch.end = new_end;
        }
        batch.base += 1;
        Ok(batch.base)
    }

    fn rebase(&self, table_id: TableId, new_base: i64, allocate: bool) -> Result<()> {
        let mut batch = self.batch.lock();
        if new_base <= batch.base {
            return Ok(());
        }
        if new_base <= batch.end {
            batch.base = new_base;
            return Ok(());
        }
        let new_end = self.reserve(table_id, new_base, if allocate { self.step } else { 0 })?;
        log::trace!("ALLOC REBASE: table_id = {table_id}, base = {new_base}, end = {new_end}");
        batch.base = new_base;
        batch.end = if allocate { new_end } else { new_base };
        Ok(())
    }

    fn base(&self) -> i64 {
        self.batch.lock().base
    }

    fn end(&self) -> i64 {
        self.batch.lock().end
    }
}
