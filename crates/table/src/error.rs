use crate::column::TypeKind;
use enum_as_inner::EnumAsInner;
use std::fmt;
use tabula_kv::KvError;
use tabula_primitives::{SchemaState, TableId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Insufficient bytes to decode value: need {need}, {left} left")]
    Insufficient { need: usize, left: usize },
    #[error("Invalid encoded flag `{0}`")]
    InvalidFlag(u8),
    #[error("Invalid marker byte `{0:#04x}` in encoded bytes group")]
    InvalidMarker(u8),
    #[error("Varint overflows 64 bits")]
    VarintOverflow,
    #[error("Invalid {kind} key `{}`", hex::encode(key))]
    InvalidKey { kind: &'static str, key: Vec<u8> },
    #[error("Encoded string is not valid UTF-8")]
    InvalidUtf8,
    #[error("Cannot decode {found} as a value of a {expected} column")]
    TypeMismatch { expected: TypeKind, found: &'static str },
}

/// A unique key (or the row handle) would be duplicated.
///
/// Carries the handle of the row already holding the key,
/// so that callers can turn the insert into an update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Duplicate entry '{entry}' for key '{key_name}'")]
pub struct DuplicateEntry {
    pub entry: Box<str>,
    pub key_name: Box<str>,
    pub handle: i64,
}

#[derive(Error, Debug, EnumAsInner)]
pub enum TableError {
    #[error("Table `{0}` is in state none and cannot be loaded")]
    TableStateNone(Box<str>),
    #[error("Column `{0}` is in state none and cannot be loaded")]
    ColumnStateNone(Box<str>),
    #[error("Index `{0}` is in state none and cannot be loaded")]
    IndexStateNone(Box<str>),
    #[error("Column `{name}` is not public (state: {state})")]
    ColumnStateNonPublic { name: Box<str>, state: SchemaState },
    #[error(transparent)]
    DuplicateEntry(#[from] DuplicateEntry),
    #[error("Column `{0}` cannot be null but has no stored value")]
    MissingValue(Box<str>),
    #[error("Cannot cast `{value}` to {to}")]
    Cast { value: String, to: TypeKind },
    #[error("Column `{name}` has offset {offset} outside the row")]
    ColumnOffset { name: Box<str>, offset: usize },
    #[error("Index `{index}` refers to column offset {offset} outside the row")]
    IndexColumnMissing { index: Box<str>, offset: usize },
    #[error("Row has {found} values but the table has {expected} columns")]
    RowLength { expected: usize, found: usize },
    #[error("Auto id space of table {0} is exhausted")]
    AutoIdExhausted(TableId),
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TableError {
    pub fn is_not_exist(&self) -> bool {
        matches!(self, Self::Kv(e) if e.is_not_exist())
    }

    pub fn is_key_exists(&self) -> bool {
        matches!(self, Self::Kv(e) if e.is_key_exists())
    }
}

/// Any error, boxed so that test bodies can use `?` across crates' error types.
pub struct TestError {
    pub error: Box<dyn std::error::Error>,
}

impl fmt::Debug for TestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // yellow
        write!(f, "\x1b[93m{}\x1b[0m", self.error)
    }
}

impl<E: std::error::Error + 'static> From<E> for TestError {
    fn from(e: E) -> Self {
        Self { error: Box::new(e) }
    }
}

/// The return type of tests that propagate errors with `?`.
pub type ResultTest<T> = Result<T, TestError>;
