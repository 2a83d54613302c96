//! Record and index key layout.
//!
//! ```text
//! record key: t{table id}_r{handle}{column id}
//! index key:  t{table id}_i{index id}{values...}[{handle}]
//! ```
//! Ids and handles use the fixed-width comparable int encoding,
//! index values the flagged comparable datum encoding.
//! The handle is only appended to index keys that are not distinct,
//! distinct keys store the handle in the value instead.

use crate::codec::{self, decode_int, encode_int};
use crate::column::{FieldType, TypeKind};
use crate::datum::{Datum, Timestamp};
use crate::error::CodecError;
use tabula_primitives::{ColId, IndexId, TableId};

type Result<T> = core::result::Result<T, CodecError>;

const TABLE_PREFIX: &[u8] = b"t";
const RECORD_PREFIX_SEP: &[u8] = b"_r";
const INDEX_PREFIX_SEP: &[u8] = b"_i";

const ID_LEN: usize = 8;
/// `t{table id}_r`.
pub const RECORD_PREFIX_LEN: usize = TABLE_PREFIX.len() + ID_LEN + RECORD_PREFIX_SEP.len();
/// `t{table id}_r{handle}`.
pub const ROW_KEY_LEN: usize = RECORD_PREFIX_LEN + ID_LEN;
/// `t{table id}_r{handle}{column id}`.
pub const RECORD_KEY_LEN: usize = ROW_KEY_LEN + ID_LEN;

/// The value of index entries that are not distinct.
pub const NON_UNIQUE_INDEX_VALUE: &[u8] = b"0";

fn gen_table_prefix(table_id: TableId, sep: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(RECORD_PREFIX_LEN);
    key.extend_from_slice(TABLE_PREFIX);
    encode_int(&mut key, table_id.get());
    key.extend_from_slice(sep);
    key
}

pub fn gen_table_record_prefix(table_id: TableId) -> Vec<u8> {
    gen_table_prefix(table_id, RECORD_PREFIX_SEP)
}

pub fn gen_table_index_prefix(table_id: TableId) -> Vec<u8> {
    gen_table_prefix(table_id, INDEX_PREFIX_SEP)
}

/// The common prefix of every column key of the row `handle`.
pub fn encode_row_key(record_prefix: &[u8], handle: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(RECORD_KEY_LEN);
    key.extend_from_slice(record_prefix);
    encode_int(&mut key, handle);
    key
}

/// The key of column `col_id` of the row `handle`.
pub fn encode_record_key(record_prefix: &[u8], handle: i64, col_id: ColId) -> Vec<u8> {
    let mut key = encode_row_key(record_prefix, handle);
    encode_int(&mut key, col_id.get());
    key
}

fn invalid_record_key(key: &[u8]) -> CodecError {
    CodecError::InvalidKey {
        kind: "record",
        key: key.to_vec(),
    }
}

/// Splits a record key into its table id, handle and column id.
pub fn decode_record_key(key: &[u8]) -> Result<(TableId, i64, ColId)> {
    if key.len() != RECORD_KEY_LEN {
        return Err(invalid_record_key(key));
    }
    let (table_id, mut rest) = decode_table_prefix(key, RECORD_PREFIX_SEP).ok_or_else(|| invalid_record_key(key))?;
    let handle = decode_int(&mut rest)?;
    let col_id = decode_int(&mut rest)?;
    Ok((table_id, handle, ColId(col_id)))
}

/// Returns the handle of any key under a row prefix, column keys included.
pub fn decode_row_key(key: &[u8]) -> Result<i64> {
    if key.len() < ROW_KEY_LEN {
        return Err(invalid_record_key(key));
    }
    let (_, mut rest) = decode_table_prefix(key, RECORD_PREFIX_SEP).ok_or_else(|| invalid_record_key(key))?;
    decode_int(&mut rest)
}

fn decode_table_prefix<'a>(key: &'a [u8], sep: &[u8]) -> Option<(TableId, &'a [u8])> {
    let mut rest = key.strip_prefix(TABLE_PREFIX)?;
    let table_id = decode_int(&mut rest).ok()?;
    let rest = rest.strip_prefix(sep)?;
    Some((TableId(table_id), rest))
}

/// `index_prefix{index id}{encoded values}`, the key to seek an index at.
pub fn encode_index_seek_key(index_prefix: &[u8], index_id: IndexId, encoded_values: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(index_prefix.len() + ID_LEN + encoded_values.len());
    key.extend_from_slice(index_prefix);
    encode_int(&mut key, index_id.get());
    key.extend_from_slice(encoded_values);
    key
}

/// Splits an index key into its table id, index id and the decoded datums that follow.
///
/// The datums are flattened, and include the trailing handle of non-distinct entries.
pub fn decode_index_key(key: &[u8]) -> Result<(TableId, IndexId, Vec<Datum>)> {
    let invalid = || CodecError::InvalidKey {
        kind: "index",
        key: key.to_vec(),
    };
    let (table_id, mut rest) = decode_table_prefix(key, INDEX_PREFIX_SEP).ok_or_else(invalid)?;
    let index_id = decode_int(&mut rest)?;
    Ok((table_id, IndexId(index_id), codec::decode(rest)?))
}

/// Encodes a single column value.
///
/// `NULL` encodes to its flag byte, so a stored value is never empty.
pub fn encode_value(value: &Datum) -> Vec<u8> {
    let mut buf = Vec::new();
    codec::encode_value(&mut buf, std::slice::from_ref(value));
    buf
}

/// Decodes a stored column value into the representation of `ft`.
pub fn decode_column_value(mut data: &[u8], ft: &FieldType) -> Result<Datum> {
    let datum = codec::decode_one(&mut data)?;
    unflatten(datum, ft)
}

/// Restores the column representation of a datum decoded by the codec.
pub fn unflatten(datum: Datum, ft: &FieldType) -> Result<Datum> {
    let mismatch = |d: &Datum| CodecError::TypeMismatch {
        expected: ft.tp,
        found: d.kind_name(),
    };
    Ok(match (ft.tp, datum) {
        (_, Datum::Null) => Datum::Null,
        (TypeKind::Int, Datum::Int(i)) if ft.flags.has_unsigned() => Datum::Uint(i as u64),
        (TypeKind::Int, Datum::Uint(u)) if !ft.flags.has_unsigned() => Datum::Int(u as i64),
        (TypeKind::Int, d @ (Datum::Int(_) | Datum::Uint(_))) => d,
        (TypeKind::Float, d @ Datum::Float(_)) => d,
        (TypeKind::Varchar, Datum::Bytes(b)) => Datum::String(String::from_utf8(b).map_err(|_| CodecError::InvalidUtf8)?),
        (TypeKind::Blob, d @ Datum::Bytes(_)) => d,
        (TypeKind::Timestamp, Datum::Int(i)) => Datum::Time(Timestamp(i)),
        (_, d) => return Err(mismatch(&d)),
    })
}
