use crate::{KvError, Result};
use core::fmt;

/// A forward cursor over key-value pairs in ascending key order.
///
/// The cursor starts positioned on its first entry, if any.
/// `key` and `value` may only be called while `valid` holds.
pub trait KvIter {
    fn valid(&self) -> bool;
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
    fn next(&mut self) -> Result<()>;
}

pub trait Retriever {
    /// Returns the value at `key` or [`KvError::NotExist`].
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Returns a cursor positioned at the first key `>= key`.
    fn seek(&self, key: &[u8]) -> Result<Box<dyn KvIter + '_>>;
}

pub trait Mutator {
    /// Sets `key` to `value`. Empty values are rejected.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Deletes `key`, or returns [`KvError::NotExist`] if it isn't visible.
    fn delete(&mut self, key: &[u8]) -> Result<()>;
}

pub trait RetrieverMutator: Retriever + Mutator {}

impl<T: Retriever + Mutator + ?Sized> RetrieverMutator for T {}

/// Per-transaction hints understood by a [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOption {
    /// While set, a `get` that misses is trusted without further checks
    /// and the key is recorded as presumed absent.
    /// If the presumption turns out to be wrong,
    /// the carried error is what the transaction reports.
    PresumeKeyNotExists(KvError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnOptionKind {
    PresumeKeyNotExists,
}

impl TxnOption {
    pub fn kind(&self) -> TxnOptionKind {
        match self {
            Self::PresumeKeyNotExists(_) => TxnOptionKind::PresumeKeyNotExists,
        }
    }
}

/// A transaction over the ordered key-value store.
///
/// The `Display` form identifies the transaction; it is what row locks store.
pub trait Transaction: Retriever + Mutator + fmt::Display {
    /// Takes write intents on `keys` without changing them.
    fn lock_keys(&mut self, keys: &[&[u8]]) -> Result<()>;

    fn set_option(&mut self, opt: TxnOption);

    fn del_option(&mut self, kind: TxnOptionKind);

    fn start_ts(&self) -> u64;
}
