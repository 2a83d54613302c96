//! The ordered, transactional key-value substrate tables are stored in.
//!
//! The store itself is a collaborator: this crate only fixes the contract
//! ([`Retriever`], [`Mutator`], [`Transaction`], [`KvIter`]) and provides
//! - [`MemBuffer`], an ordered staging map where an empty value marks a deletion,
//! - [`BufferStore`], a read-through staging scope over a transaction
//!   whose writes are merged as a unit by [`BufferStore::save`] or discarded on drop,
//! - [`UnionIter`], which overlays staged writes on a snapshot iterator,
//! - [`MemStore`], an in-memory store with optimistic write-write conflict detection.

mod buffer_store;
pub mod error;
mod kv;
mod mem_buffer;
mod mem_store;
mod union_iter;
pub mod util;

pub use buffer_store::BufferStore;
pub use error::KvError;
pub use kv::{KvIter, Mutator, Retriever, RetrieverMutator, Transaction, TxnOption, TxnOptionKind};
pub use mem_buffer::{MapIter, MemBuffer};
pub use mem_store::{MemStore, MemTxn};
pub use union_iter::UnionIter;

pub type Result<T> = core::result::Result<T, KvError>;
