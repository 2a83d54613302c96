use crate::codec;
use crate::column::{ColumnInfo, FieldType};
use crate::datum::Datum;
use crate::error::{CodecError, TableError};
use crate::tablecodec::{self, NON_UNIQUE_INDEX_VALUE};
use crate::Result;
use smallvec::SmallVec;
use tabula_kv::util::delete_with_prefix;
use tabula_kv::{KvError, KvIter, Retriever, RetrieverMutator};
use tabula_primitives::{IndexId, SchemaState, TableId};

/// The values of the indexed columns of one row, in index column order.
pub type IndexValues = SmallVec<[Datum; 2]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: Box<str>,
    /// Offset of the column in row-shaped slices.
    pub offset: usize,
}

/// The schema of one index, as of one schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub id: IndexId,
    pub name: Box<str>,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub primary: bool,
    pub state: SchemaState,
}

impl IndexInfo {
    /// A public index over the columns `cols`.
    pub fn new<'a>(id: impl Into<IndexId>, name: &str, cols: impl IntoIterator<Item = &'a ColumnInfo>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            columns: cols
                .into_iter()
                .map(|c| IndexColumn {
                    name: c.name.clone(),
                    offset: c.offset,
                })
                .collect(),
            unique: false,
            primary: false,
            state: SchemaState::Public,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.unique = true;
        self.primary = true;
        self
    }

    pub fn with_state(mut self, state: SchemaState) -> Self {
        self.state = state;
        self
    }

    /// The key name reported in duplicate entry errors.
    pub fn key_name(&self) -> &str {
        if self.primary { "PRIMARY" } else { &self.name }
    }
}

/// How an index lays out its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// A unique index on the primary key, reported as `PRIMARY` in duplicate errors.
    Primary,
    Unique,
    /// Every entry carries the handle in its key.
    NonUnique,
}

impl IndexKind {
    fn of(info: &IndexInfo) -> Self {
        match (info.primary, info.unique) {
            (true, _) => Self::Primary,
            (false, true) => Self::Unique,
            (false, false) => Self::NonUnique,
        }
    }
}

/// An index of a table, mapping the values of its columns to row handles.
///
/// Entries that are distinct, those of unique indices without `NULL` values,
/// are keyed by the values alone and store the handle as their value.
/// All other entries append the handle to the key and store [`NON_UNIQUE_INDEX_VALUE`].
#[derive(Debug, Clone)]
pub struct Index {
    info: IndexInfo,
    kind: IndexKind,
    field_types: Vec<FieldType>,
    /// `t{table id}_i{index id}`.
    prefix: Vec<u8>,
}

impl Index {
    /// Builds the index `info` of table `table_id`, whose columns are `cols`.
    pub fn new(table_id: TableId, info: IndexInfo, cols: &[ColumnInfo]) -> Result<Self> {
        if info.state == SchemaState::None {
            return Err(TableError::IndexStateNone(info.name));
        }
        let field_types = info
            .columns
            .iter()
            .map(|ic| {
                cols.iter()
                    .find(|c| c.offset == ic.offset)
                    .map(|c| c.field_type.clone())
                    .ok_or_else(|| TableError::IndexColumnMissing {
                        index: info.name.clone(),
                        offset: ic.offset,
                    })
            })
            .collect::<Result<_>>()?;
        let index_prefix = tablecodec::gen_table_index_prefix(table_id);
        Ok(Self {
            kind: IndexKind::of(&info),
            prefix: tablecodec::encode_index_seek_key(&index_prefix, info.id, &[]),
            field_types,
            info,
        })
    }

    pub fn meta(&self) -> &IndexInfo {
        &self.info
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn is_unique(&self) -> bool {
        !matches!(self.kind, IndexKind::NonUnique)
    }

    /// The prefix shared by every entry of this index.
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Whether the index covers the column at `offset`.
    pub fn covers(&self, offset: usize) -> bool {
        self.info.columns.iter().any(|c| c.offset == offset)
    }

    /// Extracts the indexed values from a row-shaped slice.
    pub fn fetch_values(&self, row: &[Datum]) -> Result<IndexValues> {
        self.info
            .columns
            .iter()
            .map(|c| {
                row.get(c.offset).cloned().ok_or_else(|| TableError::IndexColumnMissing {
                    index: self.info.name.clone(),
                    offset: c.offset,
                })
            })
            .collect()
    }

    /// Returns the key of the entry for `values` and `handle`, and whether it is distinct.
    pub fn gen_index_key(&self, values: &[Datum], handle: i64) -> (Vec<u8>, bool) {
        let distinct = self.is_unique() && !values.iter().any(Datum::is_null);
        let mut key = self.prefix.clone();
        codec::encode_key(&mut key, values);
        if !distinct {
            codec::encode_key(&mut key, &[Datum::Int(handle)]);
        }
        (key, distinct)
    }

    /// Adds the entry `values -> handle`.
    ///
    /// For a distinct entry whose key already exists, fails with [`KvError::KeyExists`]
    /// and leaves the existing entry in place.
    pub fn create<R: RetrieverMutator + ?Sized>(&self, rm: &mut R, values: &[Datum], handle: i64) -> Result<()> {
        let (key, distinct) = self.gen_index_key(values, handle);
        if !distinct {
            rm.set(&key, NON_UNIQUE_INDEX_VALUE)?;
            return Ok(());
        }
        match rm.get(&key) {
            Ok(_) => {
                return Err(KvError::KeyExists(format!("Duplicate entry for key '{}'", self.info.key_name()).into()).into());
            }
            Err(e) if e.is_not_exist() => {}
            Err(e) => return Err(e.into()),
        }
        let mut value = Vec::with_capacity(8);
        codec::encode_int(&mut value, handle);
        rm.set(&key, &value)?;
        log::trace!("INDEX ENTRY CREATED: index = {}, handle = {handle}", self.info.name);
        Ok(())
    }

    /// Removes the entry `values -> handle`, or fails with [`KvError::NotExist`].
    pub fn delete<R: RetrieverMutator + ?Sized>(&self, rm: &mut R, values: &[Datum], handle: i64) -> Result<()> {
        let (key, _) = self.gen_index_key(values, handle);
        rm.delete(&key)?;
        log::trace!("INDEX ENTRY DELETED: index = {}, handle = {handle}", self.info.name);
        Ok(())
    }

    /// Deletes every entry of the index.
    pub fn drop_all<R: RetrieverMutator + ?Sized>(&self, rm: &mut R) -> Result<usize> {
        Ok(delete_with_prefix(rm, &self.prefix)?)
    }

    /// Positions an iterator at the first entry `>= values`.
    ///
    /// Also returns whether that entry is a distinct entry for exactly `values`.
    pub fn seek<'r, R: Retriever + ?Sized>(&self, r: &'r R, values: &[Datum]) -> Result<(IndexIter<'r>, bool)> {
        let mut key = self.prefix.clone();
        codec::encode_key(&mut key, values);
        let it = r.seek(&key)?;
        let hit = it.valid() && it.key() == key.as_slice();
        Ok((self.iter(it), hit))
    }

    /// Positions an iterator at the first entry of the index.
    pub fn seek_first<'r, R: Retriever + ?Sized>(&self, r: &'r R) -> Result<IndexIter<'r>> {
        let it = r.seek(&self.prefix)?;
        Ok(self.iter(it))
    }

    fn iter<'r>(&self, it: Box<dyn KvIter + 'r>) -> IndexIter<'r> {
        IndexIter {
            it,
            prefix: self.prefix.clone(),
            field_types: self.field_types.clone(),
        }
    }

    /// Returns whether the entry `values -> handle` exists,
    /// and for a distinct entry, the handle of the row that owns its key.
    pub fn exist<R: Retriever + ?Sized>(&self, r: &R, values: &[Datum], handle: i64) -> Result<(bool, Option<i64>)> {
        let (key, distinct) = self.gen_index_key(values, handle);
        let value = match r.get(&key) {
            Ok(value) => value,
            Err(e) if e.is_not_exist() => return Ok((false, None)),
            Err(e) => return Err(e.into()),
        };
        if !distinct {
            return Ok((true, Some(handle)));
        }
        let owner = codec::decode_int(&mut value.as_slice())?;
        Ok((owner == handle, Some(owner)))
    }
}

/// Iterates the entries of one index in key order, as `(values, handle)`.
pub struct IndexIter<'r> {
    it: Box<dyn KvIter + 'r>,
    prefix: Vec<u8>,
    field_types: Vec<FieldType>,
}

impl IndexIter<'_> {
    fn decode_entry(&self) -> Result<(IndexValues, i64)> {
        let key = self.it.key();
        let invalid = || CodecError::InvalidKey {
            kind: "index",
            key: key.to_vec(),
        };
        let mut datums = codec::decode(&key[self.prefix.len()..])?;
        let handle = if self.it.value() == NON_UNIQUE_INDEX_VALUE {
            match datums.pop() {
                Some(Datum::Int(h)) => h,
                _ => return Err(invalid().into()),
            }
        } else {
            codec::decode_int(&mut self.it.value())?
        };
        if datums.len() != self.field_types.len() {
            return Err(invalid().into());
        }
        let values = datums
            .into_iter()
            .zip(&self.field_types)
            .map(|(d, ft)| tablecodec::unflatten(d, ft))
            .collect::<core::result::Result<_, CodecError>>()?;
        Ok((values, handle))
    }
}

impl Iterator for IndexIter<'_> {
    type Item = Result<(IndexValues, i64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.it.valid() || !self.it.key().starts_with(&self.prefix) {
            return None;
        }
        let entry = self.decode_entry();
        if let Err(e) = self.it.next() {
            return Some(Err(e.into()));
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::TypeKind;
    use tabula_kv::{MemStore, Mutator};

    fn cols() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new(1, "a", 0, FieldType::new(TypeKind::Varchar)),
            ColumnInfo::new(2, "b", 1, FieldType::new(TypeKind::Int)),
        ]
    }

    fn unique_index() -> Index {
        let cols = cols();
        Index::new(TableId(1), IndexInfo::new(1, "uk_a", &cols[..1]).unique(), &cols).unwrap()
    }

    #[test]
    fn unique_create_rejects_duplicates() {
        let index = unique_index();
        let store = MemStore::new();
        let mut txn = store.begin();

        let values = [Datum::from("x")];
        index.create(&mut txn, &values, 1).unwrap();
        let err = index.create(&mut txn, &values, 2).unwrap_err();
        assert!(err.is_key_exists());

        assert_eq!(index.exist(&txn, &values, 1).unwrap(), (true, Some(1)));
        assert_eq!(index.exist(&txn, &values, 2).unwrap(), (false, Some(1)));

        let (mut it, hit) = index.seek(&txn, &values).unwrap();
        assert!(hit);
        assert_eq!(it.next().unwrap().unwrap(), (IndexValues::from_vec(values.to_vec()), 1));
        assert!(it.next().is_none());
    }

    #[test]
    fn nulls_never_collide() {
        let index = unique_index();
        let store = MemStore::new();
        let mut txn = store.begin();

        index.create(&mut txn, &[Datum::Null], 1).unwrap();
        index.create(&mut txn, &[Datum::Null], 2).unwrap();
        let entries: Vec<_> = index.seek_first(&txn).unwrap().map(|e| e.unwrap().1).collect();
        assert_eq!(entries, [1, 2]);

        let (_, hit) = index.seek(&txn, &[Datum::Null]).unwrap();
        assert!(!hit);
    }

    #[test]
    fn non_unique_entries_iterate_in_value_order() {
        let cols = cols();
        let index = Index::new(TableId(1), IndexInfo::new(2, "k_b", &cols[1..]), &cols).unwrap();
        let store = MemStore::new();
        let mut txn = store.begin();
        for (b, handle) in [(5, 1), (-1, 2), (5, 0), (3, 3)] {
            index.create(&mut txn, &[Datum::Int(b)], handle).unwrap();
        }
        // An entry of another index must not leak into the iteration.
        txn.set(&tablecodec::encode_index_seek_key(&tablecodec::gen_table_index_prefix(TableId(1)), IndexId(3), b"x"), b"0")
            .unwrap();

        let entries: Vec<_> = index
            .seek_first(&txn)
            .unwrap()
            .map(|e| e.map(|(v, h)| (v[0].clone(), h)))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            entries,
            [(Datum::Int(-1), 2), (Datum::Int(3), 3), (Datum::Int(5), 0), (Datum::Int(5), 1)]
        );

        index.delete(&mut txn, &[Datum::Int(5)], 0).unwrap();
        assert!(index.delete(&mut txn, &[Datum::Int(5)], 0).unwrap_err().is_not_exist());
        assert_eq!(index.drop_all(&mut txn).unwrap(), 3);
        assert!(index.seek_first(&txn).unwrap().next().is_none());
    }

    #[test]
    fn fetch_values_checks_offsets() {
        let index = unique_index();
        assert_eq!(index.fetch_values(&[Datum::from("v"), Datum::Int(1)]).unwrap()[..], [Datum::from("v")]);
        assert!(index.fetch_values(&[]).unwrap_err().is_index_column_missing());
    }

    #[test]
    fn state_none_is_rejected() {
        let cols = cols();
        let info = IndexInfo::new(1, "gone", &cols[..1]).with_state(SchemaState::None);
        assert!(Index::new(TableId(1), info, &cols).unwrap_err().is_index_state_none());
    }
}
