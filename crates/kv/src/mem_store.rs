use crate::{
    KvError, KvIter, MapIter, MemBuffer, Mutator, Result, Retriever, Transaction, TxnOption, TxnOptionKind, UnionIter,
};
use core::fmt;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

type Data = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Default)]
struct CommittedState {
    /// Copy-on-write so that open transactions keep their snapshot.
    data: Arc<Data>,
    /// The commit version that last wrote or locked each key.
    versions: HashMap<Vec<u8>, u64>,
    /// The latest commit version.
    version: u64,
}

/// An in-memory ordered key-value store with snapshot reads
/// and optimistic write-write conflict detection at commit.
#[derive(Clone, Default)]
pub struct MemStore {
    committed: Arc<RwLock<CommittedState>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a transaction reading the latest committed snapshot.
    pub fn begin(&self) -> MemTxn {
        let committed = self.committed.read();
        MemTxn {
            store: self.clone(),
            snapshot: committed.data.clone(),
            start_ts: committed.version,
            buffer: MemBuffer::default(),
            locked: BTreeSet::new(),
            presume: None,
            presumed: RefCell::new(Vec::new()),
        }
    }

    /// The number of committed keys.
    pub fn len(&self) -> usize {
        self.committed.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all committed pairs with the given prefix, in key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let committed = self.committed.read();
        committed
            .data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// A transaction of a [`MemStore`].
///
/// Writes are buffered until [`MemTxn::commit`].
/// Dropping the transaction without committing rolls it back.
pub struct MemTxn {
    store: MemStore,
    snapshot: Arc<Data>,
    start_ts: u64,
    buffer: MemBuffer,
    locked: BTreeSet<Vec<u8>>,
    presume: Option<KvError>,
    /// Keys whose absence was presumed, with the error to report if they exist at commit.
    presumed: RefCell<Vec<(Vec<u8>, KvError)>>,
}

impl MemTxn {
    /// Applies the buffered writes to the store.
    ///
    /// Fails with the presumption's error if a key presumed absent has been committed since,
    /// or with [`KvError::WriteConflict`] if a written or locked key was committed
    /// by another transaction after this one started.
    pub fn commit(self) -> Result<()> {
        let mut guard = self.store.committed.write();
        let committed = &mut *guard;

        for (key, err) in self.presumed.borrow().iter() {
            if committed.data.contains_key(key) {
                return Err(err.clone());
            }
        }

        let touched: Vec<&[u8]> = self
            .buffer
            .iter()
            .map(|(k, _)| k)
            .chain(self.locked.iter().map(Vec::as_slice))
            .collect();
        for &key in &touched {
            if committed.versions.get(key).is_some_and(|v| *v > self.start_ts) {
                return Err(KvError::WriteConflict { key: key.to_vec() });
            }
        }

        let commit_version = committed.version + 1;
        let data = Arc::make_mut(&mut committed.data);
        for (key, value) in self.buffer.iter() {
            if value.is_empty() {
                data.remove(key);
            } else {
                data.insert(key.to_vec(), value.to_vec());
            }
        }
        for key in touched {
            committed.versions.insert(key.to_vec(), commit_version);
        }
        committed.version = commit_version;
        log::trace!(
            "TXN COMMITTED: start_ts = {}, commit_version = {commit_version}, keys = {}",
            self.start_ts,
            self.buffer.len()
        );
        Ok(())
    }

    pub fn rollback(self) {
        log::trace!("TXN ROLLED BACK: start_ts = {}", self.start_ts);
    }

    /// The number of staged keys.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl fmt::Display for MemTxn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem-txn-{}", self.start_ts)
    }
}

impl Retriever for MemTxn {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.buffer.get(key) {
            Some([]) => return Err(KvError::not_exist(key)),
            Some(value) => return Ok(value.to_vec()),
            None => {}
        }
        match self.snapshot.get(key) {
            Some(value) => Ok(value.clone()),
            None => {
                if let Some(err) = &self.presume {
                    self.presumed.borrow_mut().push((key.to_vec(), err.clone()));
                }
                Err(KvError::not_exist(key))
            }
        }
    }

    fn seek(&self, key: &[u8]) -> Result<Box<dyn KvIter + '_>> {
        let snapshot = MapIter::new(self.snapshot.range::<[u8], _>((Bound::Included(key), Bound::Unbounded)));
        let it = UnionIter::new(Box::new(self.buffer.seek(key)), Box::new(snapshot))?;
        Ok(Box::new(it))
    }
}

impl Mutator for MemTxn {
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.buffer.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.get(key)?;
        self.buffer.delete(key);
        Ok(())
    }
}

impl Transaction for MemTxn {
    fn lock_keys(&mut self, keys: &[&[u8]]) -> Result<()> {
        self.locked.extend(keys.iter().map(|k| k.to_vec()));
        Ok(())
    }

    fn set_option(&mut self, opt: TxnOption) {
        match opt {
            TxnOption::PresumeKeyNotExists(err) => self.presume = Some(err),
        }
    }

    fn del_option(&mut self, kind: TxnOptionKind) {
        match kind {
            TxnOptionKind::PresumeKeyNotExists => self.presume = None,
        }
    }

    fn start_ts(&self) -> u64 {
        self.start_ts
    }
}
