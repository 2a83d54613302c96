//! Row and index storage of relational tables over an ordered, transactional key-value store.
//!
//! A [`Table`] is an immutable snapshot of one schema version.
//! It turns row operations into key-value writes: one key per column per row
//! (see [`tablecodec`] for the layout) and one key per index entry.
//! Every operation stages its writes in a [`tabula_kv::BufferStore`]
//! and merges them into the transaction only once all of them succeeded.
//!
//! Columns and indices carry a [`SchemaState`](tabula_primitives::SchemaState),
//! and tables stay correct while neighbouring schema versions are live:
//! only public columns are read, and columns that are written but not yet public
//! are written with their default.

pub mod alloc;
pub mod codec;
pub mod column;
pub mod context;
pub mod datum;
pub mod error;
pub mod index;
pub mod options;
pub mod table;
pub mod tablecodec;

pub use alloc::{AllocMarks, Allocator, MemAllocator};
pub use column::{ColumnInfo, DefaultValue, FieldType, TypeKind};
pub use context::{Context, Evaluator, SimpleContext, SystemEvaluator};
pub use datum::{Datum, Timestamp};
pub use error::{CodecError, DuplicateEntry, TableError};
pub use index::{Index, IndexColumn, IndexInfo, IndexIter, IndexKind, IndexValues};
pub use options::StorageOptions;
pub use table::{set_col_value, Table, TableFactory, TableInfo};

pub type Result<T> = core::result::Result<T, TableError>;
