use crate::{KvError, KvIter, MemBuffer, Mutator, Result, Retriever, Transaction, UnionIter};

/// A staging scope for the writes of one logical operation.
///
/// Reads see staged writes first and fall through to the transaction.
/// Writes are only staged; [`BufferStore::save`] merges them into the transaction
/// as a unit. A `BufferStore` dropped without `save` discards everything it staged,
/// which is how every error path releases it.
pub struct BufferStore<'a> {
    txn: &'a mut dyn Transaction,
    buffer: MemBuffer,
}

impl<'a> BufferStore<'a> {
    pub fn new(txn: &'a mut dyn Transaction) -> Self {
        Self {
            txn,
            buffer: MemBuffer::default(),
        }
    }

    /// The transaction underneath, for options and locks.
    /// Writes made through it bypass the staging buffer.
    pub fn txn(&mut self) -> &mut dyn Transaction {
        &mut *self.txn
    }

    /// The number of staged keys, deletions included.
    pub fn staged(&self) -> usize {
        self.buffer.len()
    }

    /// Merges the staged writes into the transaction.
    pub fn save(mut self) -> Result<()> {
        let buffer = std::mem::take(&mut self.buffer);
        for (key, value) in buffer.iter() {
            if value.is_empty() {
                match self.txn.delete(key) {
                    // Staged deletion of a key that only ever existed in this scope.
                    Err(e) if e.is_not_exist() => {}
                    res => res?,
                }
            } else {
                self.txn.set(key, value)?;
            }
        }
        Ok(())
    }
}

impl Drop for BufferStore<'_> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            log::trace!("BUFFER STORE DISCARDED: {} staged keys", self.buffer.len());
        }
    }
}

impl Retriever for BufferStore<'_> {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.buffer.get(key) {
            Some([]) => Err(KvError::not_exist(key)),
            Some(value) => Ok(value.to_vec()),
            None => self.txn.get(key),
        }
    }

    fn seek(&self, key: &[u8]) -> Result<Box<dyn KvIter + '_>> {
        let snapshot = self.txn.seek(key)?;
        let it = UnionIter::new(Box::new(self.buffer.seek(key)), snapshot)?;
        Ok(Box::new(it))
    }
}

impl Mutator for BufferStore<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.buffer.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.get(key)?;
        self.buffer.delete(key);
        Ok(())
    }
}
