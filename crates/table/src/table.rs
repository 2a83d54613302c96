use crate::alloc::Allocator;
use crate::column::{find_col, find_on_update_cols, ColumnInfo, TypeKind};
use crate::context::{Context, Evaluator};
use crate::datum::Datum;
use crate::error::{DuplicateEntry, TableError};
use crate::index::{Index, IndexInfo};
use crate::options::StorageOptions;
use crate::tablecodec;
use crate::Result;
use itertools::Itertools;
use smallvec::SmallVec;
use std::sync::Arc;
use tabula_kv::util::{delete_with_prefix, next_until};
use tabula_kv::{BufferStore, KvError, Mutator, Retriever, RetrieverMutator, Transaction, TxnOption, TxnOptionKind};
use tabula_primitives::{ColId, SchemaState, TableId, ROW_LOCK_COL_ID};

/// The schema of a table, as of one schema version.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub id: TableId,
    pub name: Box<str>,
    /// All columns, in every state. Offsets index into this list.
    pub columns: Vec<ColumnInfo>,
    pub indices: Vec<IndexInfo>,
    /// Whether the integer primary key column is the row handle.
    /// Such a column has no record keys of its own.
    pub pk_is_handle: bool,
    pub state: SchemaState,
}

impl TableInfo {
    pub fn new(id: impl Into<TableId>, name: &str, columns: Vec<ColumnInfo>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            columns,
            indices: Vec::new(),
            pk_is_handle: false,
            state: SchemaState::Public,
        }
    }

    pub fn with_index(mut self, index: IndexInfo) -> Self {
        self.indices.push(index);
        self
    }

    pub fn with_pk_is_handle(mut self) -> Self {
        self.pk_is_handle = true;
        self
    }

    pub fn with_state(mut self, state: SchemaState) -> Self {
        self.state = state;
        self
    }
}

/// Builds a [`Table`] from its schema.
///
/// Components that load tables receive one of these explicitly,
/// usually [`Table::from_meta`].
pub type TableFactory = fn(Arc<dyn Allocator>, &TableInfo) -> Result<Table>;

/// A table of one schema version, mapping rows to record and index keys.
pub struct Table {
    meta: TableInfo,
    /// Columns visible to readers.
    public_cols: Vec<ColumnInfo>,
    /// Columns maintained by writers.
    writable_cols: Vec<ColumnInfo>,
    indices: Vec<Index>,
    /// Offset of the primary key column when it is the handle.
    pk_handle_offset: Option<usize>,
    record_prefix: Vec<u8>,
    index_prefix: Vec<u8>,
    alloc: Arc<dyn Allocator>,
    options: StorageOptions,
}

/// Encodes `value` and sets it at `key`.
pub fn set_col_value<R: RetrieverMutator + ?Sized>(rm: &mut R, key: &[u8], value: &Datum) -> Result<()> {
    rm.set(key, &tablecodec::encode_value(value))?;
    Ok(())
}

fn handle_datum(col: &ColumnInfo, handle: i64) -> Datum {
    if col.flags().has_unsigned() {
        Datum::Uint(handle as u64)
    } else {
        Datum::Int(handle)
    }
}

impl Table {
    /// Loads `meta` with the default [`StorageOptions`].
    pub fn from_meta(alloc: Arc<dyn Allocator>, meta: &TableInfo) -> Result<Self> {
        Self::with_options(alloc, meta, StorageOptions::default())
    }

    /// Loads `meta`.
    ///
    /// Fails if the table, one of its columns or one of its indices is in state none.
    pub fn with_options(alloc: Arc<dyn Allocator>, meta: &TableInfo, options: StorageOptions) -> Result<Self> {
        if meta.state == SchemaState::None {
            return Err(TableError::TableStateNone(meta.name.clone()));
        }
        for col in &meta.columns {
            if col.state == SchemaState::None {
                return Err(TableError::ColumnStateNone(col.name.clone()));
            }
            if col.offset >= meta.columns.len() {
                return Err(TableError::ColumnOffset {
                    name: col.name.clone(),
                    offset: col.offset,
                });
            }
        }
        let indices = meta
            .indices
            .iter()
            .map(|info| Index::new(meta.id, info.clone(), &meta.columns))
            .collect::<Result<Vec<_>>>()?;

        let pk_handle_offset = meta
            .pk_is_handle
            .then(|| meta.columns.iter().find(|c| c.flags().has_pri_key()))
            .flatten()
            .map(|c| c.offset);

        let public_cols = meta.columns.iter().filter(|c| c.state.is_public()).cloned().collect();
        let writable_cols = meta.columns.iter().filter(|c| c.state.is_writable()).cloned().collect();

        log::trace!(
            "TABLE LOADED: id = {}, name = {}, columns = {}, indices = {}",
            meta.id,
            meta.name,
            meta.columns.len(),
            indices.len()
        );

        Ok(Self {
            record_prefix: tablecodec::gen_table_record_prefix(meta.id),
            index_prefix: tablecodec::gen_table_index_prefix(meta.id),
            meta: meta.clone(),
            public_cols,
            writable_cols,
            indices,
            pk_handle_offset,
            alloc,
            options,
        })
    }

    pub fn meta(&self) -> &TableInfo {
        &self.meta
    }

    pub fn id(&self) -> TableId {
        self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// The public columns.
    pub fn cols(&self) -> &[ColumnInfo] {
        &self.public_cols
    }

    /// The columns writers maintain, public or not.
    pub fn writable_cols(&self) -> &[ColumnInfo] {
        &self.writable_cols
    }

    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    /// Finds a public column by name, ignoring ASCII case.
    pub fn find_col(&self, name: &str) -> Option<&ColumnInfo> {
        find_col(&self.public_cols, name)
    }

    /// Finds the public index on exactly the column `name`, ignoring ASCII case.
    pub fn find_index_by_col_name(&self, name: &str) -> Option<&Index> {
        self.indices.iter().find(|index| {
            let meta = index.meta();
            meta.state.is_public() && matches!(&*meta.columns, [c] if c.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn record_prefix(&self) -> &[u8] {
        &self.record_prefix
    }

    pub fn index_prefix(&self) -> &[u8] {
        &self.index_prefix
    }

    pub fn record_key(&self, handle: i64, col_id: ColId) -> Vec<u8> {
        tablecodec::encode_record_key(&self.record_prefix, handle, col_id)
    }

    /// The key to start a scan of the whole table at.
    pub fn first_key(&self) -> Vec<u8> {
        self.record_key(0, ROW_LOCK_COL_ID)
    }

    pub fn alloc_auto_id(&self) -> Result<i64> {
        self.alloc.alloc(self.meta.id)
    }

    pub fn rebase_auto_id(&self, new_base: i64, allocate: bool) -> Result<()> {
        self.alloc.rebase(self.meta.id, new_base, allocate)
    }

    /// Inserts `row`, which holds a value for every column, at its offset.
    ///
    /// The handle is the value of the primary key column when it is the handle and not `NULL`,
    /// otherwise a fresh one from the allocator.
    /// Returns the handle of the new row.
    ///
    /// If the handle or a unique index key is taken, fails with [`TableError::DuplicateEntry`]
    /// carrying the handle of the row holding it, and writes nothing.
    pub fn add_record(&self, ctx: &mut dyn Context, row: &[Datum]) -> Result<i64> {
        self.check_row_len(row)?;
        let mut row = row.to_vec();

        let handle = match self.pk_handle_offset {
            Some(offset) if !row[offset].is_null() => match &row[offset] {
                Datum::Int(i) => *i,
                Datum::Uint(u) => *u as i64,
                d => {
                    return Err(TableError::Cast {
                        value: d.to_string(),
                        to: TypeKind::Int,
                    });
                }
            },
            Some(offset) => {
                let handle = self.alloc_auto_id()?;
                row[offset] = handle_datum(&self.meta.columns[offset], handle);
                handle
            }
            None => self.alloc_auto_id()?,
        };

        // Readers of older schema versions can't see these yet,
        // so what they hold must not depend on the caller.
        for col in self.writable_cols.iter().filter(|c| c.state.is_write_only()) {
            row[col.offset] = Self::non_public_value(ctx.evaluator(), col)?;
        }

        let col_writes: SmallVec<[(ColId, &Datum); 8]> = self
            .writable_cols
            .iter()
            .filter(|col| !self.is_pk_handle(col))
            .map(|col| (col, &row[col.offset]))
            .filter(|(col, value)| {
                !(value.is_null() && col.default_value.is_none() && self.options.skip_null_columns)
            })
            .map(|(col, value)| (col.id, value))
            .collect();

        let mut bs = BufferStore::new(ctx.txn());
        {
            let mut bs = scopeguard::guard(&mut bs, |bs| bs.txn().del_option(TxnOptionKind::PresumeKeyNotExists));
            if self.pk_handle_offset.is_some() {
                self.check_handle_free(&mut bs, handle)?;
            }
            self.add_indices(&mut bs, handle, &row)?;
        }

        self.set_row_lock(&mut bs, handle)?;
        for (col_id, value) in col_writes {
            set_col_value(&mut bs, &self.record_key(handle, col_id), value)?;
        }
        bs.save()?;
        ctx.add_affected_rows(1);

        log::trace!("ROW ADDED: table = {}, handle = {handle}", self.meta.name);
        Ok(handle)
    }

    /// Replaces the row `handle`, currently `old`, by `new`.
    ///
    /// Only the columns flagged in `touched`, indexed by offset, are written,
    /// plus the on-update columns not touched already, which are set to the current time.
    /// Indices are only rewritten when they cover a written column.
    ///
    /// Columns that aren't public are read from storage rather than taken from `old` and `new`,
    /// and only written when they are on-update columns.
    pub fn update_record(
        &self,
        ctx: &mut dyn Context,
        handle: i64,
        old: &[Datum],
        new: &[Datum],
        touched: &[bool],
    ) -> Result<()> {
        self.check_row_len(old)?;
        self.check_row_len(new)?;
        let mut old = old.to_vec();
        let mut new = new.to_vec();
        let mut touched: SmallVec<[bool; 16]> = (0..self.meta.columns.len())
            .map(|offset| touched.get(offset).copied().unwrap_or(false))
            .collect();

        for col in self.writable_cols.iter().filter(|c| c.state.is_write_only()) {
            let stored = self.stored_value(ctx.txn(), handle, col)?;
            old[col.offset] = stored.clone();
            new[col.offset] = stored;
            touched[col.offset] = false;
        }
        for col in find_on_update_cols(&self.writable_cols) {
            if !touched[col.offset] {
                let evaluator = ctx.evaluator();
                new[col.offset] = evaluator.cast(&evaluator.current_timestamp()?, col)?;
                touched[col.offset] = true;
            }
        }

        let mut bs = BufferStore::new(ctx.txn());
        for col in &self.writable_cols {
            if touched[col.offset] && !self.is_pk_handle(col) {
                set_col_value(&mut bs, &self.record_key(handle, col.id), &new[col.offset])?;
            }
        }
        {
            let mut bs = scopeguard::guard(&mut bs, |bs| bs.txn().del_option(TxnOptionKind::PresumeKeyNotExists));
            self.rebuild_indices(&mut bs, handle, &touched, &old, &new)?;
        }
        bs.save()?;

        log::trace!("ROW UPDATED: table = {}, handle = {handle}", self.meta.name);
        Ok(())
    }

    /// Deletes the row `handle`, whose current values are `row`, and its index entries.
    pub fn remove_record(&self, ctx: &mut dyn Context, handle: i64, row: &[Datum]) -> Result<()> {
        self.check_row_len(row)?;
        let mut bs = BufferStore::new(ctx.txn());
        self.set_row_lock(&mut bs, handle)?;
        self.remove_row_data(&mut bs, handle, row)?;
        self.remove_row_indices(&mut bs, handle, row)?;
        bs.save()?;

        log::trace!("ROW REMOVED: table = {}, handle = {handle}", self.meta.name);
        Ok(())
    }

    /// Reads the public columns of the row `handle`.
    pub fn row(&self, ctx: &mut dyn Context, handle: i64) -> Result<Vec<Datum>> {
        self.row_with_cols(ctx, handle, &self.public_cols)
    }

    /// Reads `cols` of the row `handle`, in the order of `cols`.
    ///
    /// A column without stored value reads as `NULL`, unless it is not-null.
    pub fn row_with_cols(&self, ctx: &mut dyn Context, handle: i64, cols: &[ColumnInfo]) -> Result<Vec<Datum>> {
        let txn: &dyn Transaction = ctx.txn();
        cols.iter()
            .map(|col| {
                if !col.state.is_public() {
                    return Err(TableError::ColumnStateNonPublic {
                        name: col.name.clone(),
                        state: col.state,
                    });
                }
                if self.is_pk_handle(col) {
                    return Ok(handle_datum(col, handle));
                }
                match txn.get(&self.record_key(handle, col.id)) {
                    Ok(data) => Ok(tablecodec::decode_column_value(&data, &col.field_type)?),
                    Err(e) if e.is_not_exist() && !col.is_not_null() => Ok(Datum::Null),
                    Err(e) if e.is_not_exist() => Err(TableError::MissingValue(col.name.clone())),
                    Err(e) => Err(e.into()),
                }
            })
            .collect()
    }

    /// Scans the rows from `start_key` on, in handle order,
    /// calling `f` with the handle and the values of `cols` of each row
    /// until it returns `false`.
    ///
    /// A column without stored value yields [`ColumnInfo::missing_value`].
    pub fn iter_records(
        &self,
        ctx: &mut dyn Context,
        start_key: &[u8],
        cols: &[ColumnInfo],
        mut f: impl FnMut(i64, Vec<Datum>, &[ColumnInfo]) -> Result<bool>,
    ) -> Result<()> {
        let txn: &dyn Transaction = ctx.txn();
        let mut it = txn.seek(start_key)?;
        if !it.valid() {
            return Ok(());
        }
        log::debug!(
            "ITER RECORDS: table = {}, start_key = {}, key = {}",
            self.meta.name,
            hex::encode(start_key),
            hex::encode(it.key())
        );

        while it.valid() && it.key().starts_with(&self.record_prefix) {
            let handle = tablecodec::decode_row_key(it.key())?;
            let mut data = Vec::with_capacity(cols.len());
            for col in cols {
                if self.is_pk_handle(col) {
                    data.push(handle_datum(col, handle));
                    continue;
                }
                data.push(self.stored_value(txn, handle, col)?);
            }
            if !f(handle, data, cols)? {
                return Ok(());
            }

            let row_key = tablecodec::encode_row_key(&self.record_prefix, handle);
            next_until(&mut *it, |key| !key.starts_with(&row_key))?;
        }
        Ok(())
    }

    /// Returns the handle of the first row at or after `handle`.
    pub fn seek(&self, ctx: &mut dyn Context, handle: i64) -> Result<Option<i64>> {
        let txn: &dyn Transaction = ctx.txn();
        let it = txn.seek(&tablecodec::encode_row_key(&self.record_prefix, handle))?;
        if !it.valid() || !it.key().starts_with(&self.record_prefix) {
            return Ok(None);
        }
        Ok(Some(tablecodec::decode_row_key(it.key())?))
    }

    /// Deletes every row and index entry of the table.
    pub fn truncate(&self, ctx: &mut dyn Context) -> Result<()> {
        let txn = ctx.txn();
        let records = delete_with_prefix(&mut *txn, &self.record_prefix)?;
        let entries = delete_with_prefix(&mut *txn, &self.index_prefix)?;
        log::trace!(
            "TABLE TRUNCATED: table = {}, record keys = {records}, index entries = {entries}",
            self.meta.name
        );
        Ok(())
    }

    /// Takes a lock on the row `handle`.
    ///
    /// A write lock writes the transaction at the row lock key, a read lock only takes the intent.
    pub fn lock_row(&self, ctx: &mut dyn Context, handle: i64, for_read: bool) -> Result<()> {
        let txn = ctx.txn();
        let key = self.record_key(handle, ROW_LOCK_COL_ID);
        if for_read {
            txn.lock_keys(&[key.as_slice()])?;
        } else {
            let desc = txn.to_string();
            txn.set(&key, desc.as_bytes())?;
        }
        Ok(())
    }
}

// Private API:
impl Table {
    fn check_row_len(&self, row: &[Datum]) -> Result<()> {
        if row.len() != self.meta.columns.len() {
            return Err(TableError::RowLength {
                expected: self.meta.columns.len(),
                found: row.len(),
            });
        }
        Ok(())
    }

    fn is_pk_handle(&self, col: &ColumnInfo) -> bool {
        self.pk_handle_offset == Some(col.offset)
    }

    /// Whether a missing key of an element in `state` is expected.
    fn tolerates_missing(&self, state: SchemaState) -> bool {
        !state.is_public() && self.options.tolerate_missing_non_public
    }

    /// The value written for a column that isn't public: its default, or its zero value if it is not-null.
    fn non_public_value(evaluator: &dyn Evaluator, col: &ColumnInfo) -> Result<Datum> {
        Ok(match evaluator.eval_default(col)? {
            Some(value) => value,
            None if col.is_not_null() => Datum::zero(&col.field_type),
            None => Datum::Null,
        })
    }

    /// The stored value of `col` in the row `handle`, or [`ColumnInfo::missing_value`] without one.
    fn stored_value(&self, txn: &dyn Transaction, handle: i64, col: &ColumnInfo) -> Result<Datum> {
        match txn.get(&self.record_key(handle, col.id)) {
            Ok(data) => Ok(tablecodec::decode_column_value(&data, &col.field_type)?),
            Err(e) if e.is_not_exist() => col.missing_value(),
            Err(e) => Err(e.into()),
        }
    }

    fn set_row_lock(&self, bs: &mut BufferStore<'_>, handle: i64) -> Result<()> {
        let desc = bs.txn().to_string();
        bs.set(&self.record_key(handle, ROW_LOCK_COL_ID), desc.as_bytes())?;
        Ok(())
    }

    /// Fails with a duplicate entry error if the row `handle` exists.
    fn check_handle_free(&self, bs: &mut BufferStore<'_>, handle: i64) -> Result<()> {
        let dup = DuplicateEntry {
            entry: handle.to_string().into(),
            key_name: "PRIMARY".into(),
            handle,
        };
        bs.txn()
            .set_option(TxnOption::PresumeKeyNotExists(KvError::KeyExists(dup.to_string().into())));
        let res = bs.get(&self.record_key(handle, ROW_LOCK_COL_ID));
        bs.txn().del_option(TxnOptionKind::PresumeKeyNotExists);
        match res {
            Ok(_) => Err(dup.into()),
            Err(e) if e.is_not_exist() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn add_indices(&self, bs: &mut BufferStore<'_>, handle: i64, row: &[Datum]) -> Result<()> {
        for index in self.indices.iter().filter(|i| i.meta().state.is_writable()) {
            let values = index.fetch_values(row)?;
            self.create_index_entry(bs, index, &values, handle)?;
        }
        Ok(())
    }

    /// Creates an index entry, turning a taken unique key into a duplicate entry error
    /// carrying the handle that holds it.
    fn create_index_entry(&self, bs: &mut BufferStore<'_>, index: &Index, values: &[Datum], handle: i64) -> Result<()> {
        if !index.is_unique() {
            return index.create(bs, values, handle);
        }
        let dup = DuplicateEntry {
            entry: values.iter().join("-").into(),
            key_name: index.meta().key_name().into(),
            handle,
        };
        bs.txn()
            .set_option(TxnOption::PresumeKeyNotExists(KvError::KeyExists(dup.to_string().into())));
        let res = index.create(bs, values, handle);
        bs.txn().del_option(TxnOptionKind::PresumeKeyNotExists);
        match res {
            Err(e) if e.is_key_exists() => {
                let (mut it, hit) = index.seek(&*bs, values)?;
                match (hit, it.next()) {
                    (true, Some(entry)) => Err(DuplicateEntry {
                        handle: entry?.1,
                        ..dup
                    }
                    .into()),
                    _ => Err(e),
                }
            }
            res => res,
        }
    }

    fn delete_index_entry(&self, bs: &mut BufferStore<'_>, index: &Index, values: &[Datum], handle: i64) -> Result<()> {
        match index.delete(bs, values, handle) {
            Err(e) if e.is_not_exist() && self.tolerates_missing(index.meta().state) => {
                log::debug!(
                    "INDEX ENTRY MISSING: index = {} ({}), handle = {handle}",
                    index.meta().name,
                    index.meta().state
                );
                Ok(())
            }
            res => res,
        }
    }

    fn rebuild_indices(
        &self,
        bs: &mut BufferStore<'_>,
        handle: i64,
        touched: &[bool],
        old: &[Datum],
        new: &[Datum],
    ) -> Result<()> {
        for index in self.indices.iter().filter(|i| i.meta().state.is_writable()) {
            if !touched.iter().enumerate().any(|(offset, t)| *t && index.covers(offset)) {
                continue;
            }
            let old_values = index.fetch_values(old)?;
            self.delete_index_entry(bs, index, &old_values, handle)?;
            let new_values = index.fetch_values(new)?;
            self.create_index_entry(bs, index, &new_values, handle)?;
        }
        Ok(())
    }

    fn remove_row_data(&self, bs: &mut BufferStore<'_>, handle: i64, row: &[Datum]) -> Result<()> {
        for col in &self.meta.columns {
            if self.is_pk_handle(col) {
                continue;
            }
            match bs.delete(&self.record_key(handle, col.id)) {
                Ok(()) => {}
                // Never written: `NULL` without default, or added by a schema change in flight.
                Err(e) if e.is_not_exist() && (row[col.offset].is_null() || self.tolerates_missing(col.state)) => {
                    log::debug!(
                        "RECORD KEY MISSING: column = {} ({}), handle = {handle}",
                        col.name,
                        col.state
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        bs.delete(&self.record_key(handle, ROW_LOCK_COL_ID))?;
        Ok(())
    }

    fn remove_row_indices(&self, bs: &mut BufferStore<'_>, handle: i64, row: &[Datum]) -> Result<()> {
        for index in &self.indices {
            let values = index.fetch_values(row)?;
            self.delete_index_entry(bs, index, &values, handle)?;
        }
        Ok(())
    }
}
