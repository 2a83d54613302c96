use proptest::prelude::*;
use std::sync::Arc;
use tabula_kv::{KvError, MemStore, Mutator, Retriever};
use tabula_primitives::{ColId, ColumnFlags, SchemaState, ROW_LOCK_COL_ID};
use tabula_table::error::ResultTest;
use tabula_table::*;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct FixedClock(Timestamp);

impl Evaluator for FixedClock {
    fn current_timestamp(&self) -> Result<Datum> {
        Ok(Datum::Time(self.0))
    }
}

fn alloc() -> Arc<dyn Allocator> {
    Arc::new(MemAllocator::new(AllocMarks::default(), 100))
}

fn int() -> FieldType {
    FieldType::new(TypeKind::Int)
}

fn pk_col() -> ColumnInfo {
    ColumnInfo::new(1, "id", 0, int().with_flags(ColumnFlags::PRI_KEY | ColumnFlags::NOT_NULL))
}

/// `(id int primary key, name varchar, unique key idx_name (name))`, the id being the handle.
fn id_name_table() -> Table {
    let cols = vec![pk_col(), ColumnInfo::new(2, "name", 1, FieldType::new(TypeKind::Varchar))];
    let meta = TableInfo::new(1, "users", cols.clone())
        .with_pk_is_handle()
        .with_index(IndexInfo::new(1, "idx_name", &cols[1..]).unique());
    Table::from_meta(alloc(), &meta).unwrap()
}

/// All pairs under `prefix`, in key order.
fn entries<R: Retriever + ?Sized>(r: &R, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut it = r.seek(prefix).unwrap();
    let mut out = Vec::new();
    while it.valid() && it.key().starts_with(prefix) {
        out.push((it.key().to_vec(), it.value().to_vec()));
        it.next().unwrap();
    }
    out
}

fn keys<R: Retriever + ?Sized>(r: &R, prefix: &[u8]) -> Vec<Vec<u8>> {
    entries(r, prefix).into_iter().map(|(k, _)| k).collect()
}

#[test]
fn test_id_name_scenario() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let table = id_name_table();
    let mut ctx = SimpleContext::new(store.begin());

    assert_eq!(table.add_record(&mut ctx, &[1.into(), "a".into()])?, 1);

    let dup = table
        .add_record(&mut ctx, &[2.into(), "a".into()])
        .unwrap_err()
        .into_duplicate_entry()
        .unwrap();
    assert_eq!(dup.handle, 1);
    assert_eq!(dup.to_string(), "Duplicate entry 'a' for key 'idx_name'");
    // Nothing of the rejected row was written.
    assert_eq!(table.seek(&mut ctx, 2)?, None);
    assert_eq!(ctx.affected_rows(), 1);

    table.update_record(
        &mut ctx,
        1,
        &[1.into(), "a".into()],
        &[1.into(), "b".into()],
        &[false, true],
    )?;

    let index = table.find_index_by_col_name("name").unwrap();
    {
        let txn = ctx.txn();
        let (_, hit) = index.seek(&*txn, &["a".into()])?;
        assert!(!hit);
        let (mut it, hit) = index.seek(&*txn, &["b".into()])?;
        assert!(hit);
        assert_eq!(it.next().unwrap()?.1, 1);
    }
    assert_eq!(table.row(&mut ctx, 1)?, [Datum::Int(1), Datum::from("b")]);

    // "a" is free again.
    assert_eq!(table.add_record(&mut ctx, &[2.into(), "a".into()])?, 2);
    ctx.commit()?;
    Ok(())
}

#[test]
fn test_duplicate_handle_is_reported_first() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let table = id_name_table();
    let mut ctx = SimpleContext::new(store.begin());

    table.add_record(&mut ctx, &[7.into(), "a".into()])?;
    // Both the handle and the name collide.
    let dup = table
        .add_record(&mut ctx, &[7.into(), "a".into()])
        .unwrap_err()
        .into_duplicate_entry()
        .unwrap();
    assert_eq!(&*dup.key_name, "PRIMARY");
    assert_eq!(dup.handle, 7);
    Ok(())
}

#[test]
fn test_unique_conflict_reports_existing_allocated_handle() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let cols = vec![
        ColumnInfo::new(1, "a", 0, int()),
        ColumnInfo::new(2, "b", 1, FieldType::new(TypeKind::Varchar)),
    ];
    let meta = TableInfo::new(2, "t", cols.clone()).with_index(IndexInfo::new(1, "uk_ab", &cols).unique());
    let table = Table::from_meta(alloc(), &meta)?;
    let mut ctx = SimpleContext::new(store.begin());

    let first = table.add_record(&mut ctx, &[1.into(), "x".into()])?;
    table.add_record(&mut ctx, &[2.into(), "x".into()])?;
    let dup = table
        .add_record(&mut ctx, &[1.into(), "x".into()])
        .unwrap_err()
        .into_duplicate_entry()
        .unwrap();
    assert_eq!(dup.handle, first);
    assert_eq!(&*dup.entry, "1-x");

    // NULLs never collide.
    table.add_record(&mut ctx, &[Datum::Null, "x".into()])?;
    table.add_record(&mut ctx, &[Datum::Null, "x".into()])?;
    assert_eq!(ctx.affected_rows(), 4);
    Ok(())
}

#[test]
fn test_concurrent_duplicate_fails_at_commit() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let table = id_name_table();
    let mut ctx1 = SimpleContext::new(store.begin());
    let mut ctx2 = SimpleContext::new(store.begin());

    table.add_record(&mut ctx1, &[1.into(), "a".into()])?;
    table.add_record(&mut ctx2, &[2.into(), "a".into()])?;
    ctx1.commit()?;
    assert_eq!(
        ctx2.commit(),
        Err(KvError::KeyExists("Duplicate entry 'a' for key 'idx_name'".into()))
    );
    Ok(())
}

#[test]
fn test_existence_hint_is_cleared() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let table = id_name_table();
    let mut ctx = SimpleContext::new(store.begin());
    table.add_record(&mut ctx, &[1.into(), "a".into()])?;
    assert!(table.add_record(&mut ctx, &[2.into(), "a".into()]).is_err());

    // A later miss is an ordinary read, not a presumption checked at commit.
    assert!(ctx.txn().get(b"unrelated").unwrap_err().is_not_exist());
    let mut other = store.begin();
    other.set(b"unrelated", b"1")?;
    other.commit()?;

    ctx.commit()?;
    Ok(())
}

#[test]
fn test_null_without_default_is_not_stored() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let cols = vec![
        pk_col(),
        ColumnInfo::new(2, "note", 1, FieldType::new(TypeKind::Varchar)),
        ColumnInfo::new(3, "score", 2, int()).with_default(DefaultValue::Literal(5.into())),
    ];
    let table = Table::from_meta(alloc(), &TableInfo::new(3, "t", cols).with_pk_is_handle())?;
    let mut ctx = SimpleContext::new(store.begin());

    table.add_record(&mut ctx, &[1.into(), Datum::Null, Datum::Null])?;
    assert_eq!(
        keys(ctx.txn(), table.record_prefix()),
        [table.record_key(1, ROW_LOCK_COL_ID), table.record_key(1, ColId(3))]
    );
    assert_eq!(table.row(&mut ctx, 1)?, [Datum::Int(1), Datum::Null, Datum::Null]);

    // Removing tolerates the key that was never written.
    table.remove_record(&mut ctx, 1, &[1.into(), Datum::Null, Datum::Null])?;
    assert!(keys(ctx.txn(), table.record_prefix()).is_empty());
    Ok(())
}

#[test]
fn test_null_columns_can_be_stored() -> ResultTest<()> {
    let store = MemStore::new();
    let cols = vec![pk_col(), ColumnInfo::new(2, "note", 1, FieldType::new(TypeKind::Varchar))];
    let options = StorageOptions {
        skip_null_columns: false,
        ..StorageOptions::default()
    };
    let table = Table::with_options(alloc(), &TableInfo::new(3, "t", cols).with_pk_is_handle(), options)?;
    let mut ctx = SimpleContext::new(store.begin());

    table.add_record(&mut ctx, &[1.into(), Datum::Null])?;
    assert_eq!(keys(ctx.txn(), table.record_prefix()).len(), 2);
    assert_eq!(table.row(&mut ctx, 1)?, [Datum::Int(1), Datum::Null]);
    Ok(())
}

#[test]
fn test_update_rewrites_only_covering_indices() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let cols = vec![pk_col(), ColumnInfo::new(2, "a", 1, int()), ColumnInfo::new(3, "b", 2, int())];
    let meta = TableInfo::new(4, "t", cols.clone())
        .with_pk_is_handle()
        .with_index(IndexInfo::new(1, "idx_a", &cols[1..2]))
        .with_index(IndexInfo::new(2, "uk_b", &cols[2..3]).unique());
    let table = Table::from_meta(alloc(), &meta)?;
    let (idx_a, uk_b) = (&table.indices()[0], &table.indices()[1]);
    let mut ctx = SimpleContext::new(store.begin());

    table.add_record(&mut ctx, &[1.into(), 10.into(), 100.into()])?;
    let b_before = entries(ctx.txn(), uk_b.prefix());

    table.update_record(
        &mut ctx,
        1,
        &[1.into(), 10.into(), 100.into()],
        &[1.into(), 20.into(), 100.into()],
        &[false, true, false],
    )?;

    assert_eq!(idx_a.exist(ctx.txn(), &[10.into()], 1)?, (false, None));
    assert_eq!(idx_a.exist(ctx.txn(), &[20.into()], 1)?, (true, Some(1)));
    assert_eq!(entries(ctx.txn(), uk_b.prefix()), b_before);
    assert_eq!(table.row(&mut ctx, 1)?, [Datum::Int(1), Datum::Int(20), Datum::Int(100)]);

    // A conflicting update leaves the row as it was.
    table.add_record(&mut ctx, &[2.into(), 30.into(), 200.into()])?;
    let err = table
        .update_record(
            &mut ctx,
            2,
            &[2.into(), 30.into(), 200.into()],
            &[2.into(), 30.into(), 100.into()],
            &[false, false, true],
        )
        .unwrap_err();
    assert_eq!(err.into_duplicate_entry().unwrap().handle, 1);
    assert_eq!(table.row(&mut ctx, 2)?, [Datum::Int(2), Datum::Int(30), Datum::Int(200)]);
    assert_eq!(uk_b.exist(ctx.txn(), &[200.into()], 2)?, (true, Some(2)));
    Ok(())
}

#[test]
fn test_update_sets_on_update_columns() -> ResultTest<()> {
    let store = MemStore::new();
    let cols = vec![
        pk_col(),
        ColumnInfo::new(2, "v", 1, int()),
        ColumnInfo::new(
            3,
            "updated_at",
            2,
            FieldType::new(TypeKind::Timestamp).with_flags(ColumnFlags::ON_UPDATE_NOW),
        ),
    ];
    let table = Table::from_meta(alloc(), &TableInfo::new(5, "t", cols).with_pk_is_handle())?;
    let mut ctx = SimpleContext::with_evaluator(store.begin(), FixedClock(Timestamp(1_000)));

    let old = [1.into(), 1.into(), Datum::Time(Timestamp(0))];
    table.add_record(&mut ctx, &old)?;

    let new = [1.into(), 2.into(), Datum::Time(Timestamp(0))];
    table.update_record(&mut ctx, 1, &old, &new, &[false, true, false])?;
    assert_eq!(table.row(&mut ctx, 1)?[2], Datum::Time(Timestamp(1_000)));

    // An explicit value wins.
    let explicit = [1.into(), 3.into(), Datum::Time(Timestamp(5))];
    table.update_record(&mut ctx, 1, &new, &explicit, &[false, true, true])?;
    assert_eq!(table.row(&mut ctx, 1)?[2], Datum::Time(Timestamp(5)));
    Ok(())
}

/// The same table in three schema versions: before, during and after adding column `c`
/// with an index on it.
fn add_column_versions(options: StorageOptions) -> [Table; 3] {
    let marks = AllocMarks::default();
    let base = vec![pk_col(), ColumnInfo::new(2, "a", 1, int())];
    let c = ColumnInfo::new(3, "c", 2, int().with_flags(ColumnFlags::NOT_NULL))
        .with_default(DefaultValue::Literal(7.into()));
    let version = |state: Option<SchemaState>| {
        let mut cols = base.clone();
        let mut meta = TableInfo::new(6, "t", cols.clone()).with_pk_is_handle();
        if let Some(state) = state {
            cols.push(c.clone().with_state(state));
            meta = TableInfo::new(6, "t", cols.clone())
                .with_pk_is_handle()
                .with_index(IndexInfo::new(1, "idx_c", &cols[2..]).with_state(state));
        }
        let alloc = Arc::new(MemAllocator::with_options(marks.clone(), &options));
        Table::with_options(alloc, &meta, options).unwrap()
    };
    [
        version(None),
        version(Some(SchemaState::WriteOnly)),
        version(Some(SchemaState::Public)),
    ]
}

#[test]
fn test_write_only_column_gets_its_default() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let [_, during, after] = add_column_versions(StorageOptions::default());
    let mut ctx = SimpleContext::new(store.begin());

    // The caller's value for `c` is ignored while it isn't public.
    during.add_record(&mut ctx, &[1.into(), 5.into(), 999.into()])?;
    assert_eq!(during.row(&mut ctx, 1)?, [Datum::Int(1), Datum::Int(5)]);
    assert!(
        during
            .row_with_cols(&mut ctx, 1, &during.meta().columns[2..])
            .unwrap_err()
            .is_column_state_non_public()
    );

    assert_eq!(after.row(&mut ctx, 1)?, [Datum::Int(1), Datum::Int(5), Datum::Int(7)]);
    let idx_c = after.find_index_by_col_name("c").unwrap();
    assert_eq!(idx_c.exist(ctx.txn(), &[7.into()], 1)?, (true, Some(1)));
    Ok(())
}

#[test]
fn test_remove_tolerates_keys_of_write_only_elements() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let [before, during, after] = add_column_versions(StorageOptions::default());
    let mut ctx = SimpleContext::new(store.begin());

    before.add_record(&mut ctx, &[1.into(), 5.into()])?;

    // Written before `c` existed: a not-null column without stored value.
    assert!(after.row(&mut ctx, 1).unwrap_err().is_missing_value());
    // Scans fall back to the default.
    let mut rows = Vec::new();
    after.iter_records(&mut ctx, &after.first_key(), after.cols(), |h, data, _| {
        rows.push((h, data));
        Ok(true)
    })?;
    assert_eq!(rows, [(1, vec![Datum::Int(1), Datum::Int(5), Datum::Int(7)])]);

    // Neither the record key of `c` nor its index entry exist.
    during.remove_record(&mut ctx, 1, &[1.into(), 5.into(), 7.into()])?;
    assert!(keys(ctx.txn(), during.record_prefix()).is_empty());
    assert!(keys(ctx.txn(), during.index_prefix()).is_empty());
    ctx.commit()?;
    assert!(store.is_empty());
    Ok(())
}

#[test]
fn test_strict_remove_reports_missing_keys() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let strict = StorageOptions {
        tolerate_missing_non_public: false,
        ..StorageOptions::default()
    };
    let [before, during, _] = add_column_versions(strict);
    let mut ctx = SimpleContext::new(store.begin());

    before.add_record(&mut ctx, &[1.into(), 5.into()])?;
    let err = during.remove_record(&mut ctx, 1, &[1.into(), 5.into(), 7.into()]).unwrap_err();
    assert!(err.is_not_exist());
    // The failed removal left the row in place.
    assert_eq!(before.row(&mut ctx, 1)?, [Datum::Int(1), Datum::Int(5)]);
    Ok(())
}

/// `(id, v, ts)`, `ts` being an on-update timestamp indexed together with `v`,
/// as it is added (write-only) and once it is public.
fn on_update_versions() -> [Table; 2] {
    let marks = AllocMarks::default();
    let version = |state: SchemaState| {
        let cols = vec![
            pk_col(),
            ColumnInfo::new(2, "v", 1, int()),
            ColumnInfo::new(
                3,
                "ts",
                2,
                FieldType::new(TypeKind::Timestamp).with_flags(ColumnFlags::ON_UPDATE_NOW),
            )
            .with_default(DefaultValue::Literal(Datum::Time(Timestamp(7))))
            .with_state(state),
        ];
        let meta = TableInfo::new(10, "t", cols.clone())
            .with_pk_is_handle()
            .with_index(IndexInfo::new(1, "idx_v_ts", &cols[1..]).with_state(state));
        Table::from_meta(Arc::new(MemAllocator::new(marks.clone(), 100)), &meta).unwrap()
    };
    [version(SchemaState::WriteOnly), version(SchemaState::Public)]
}

#[test]
fn test_update_sets_write_only_on_update_column() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let [during, after] = on_update_versions();
    let mut ctx = SimpleContext::with_evaluator(store.begin(), FixedClock(Timestamp(1_000)));

    during.add_record(&mut ctx, &[1.into(), 1.into(), Datum::Null])?;
    assert_eq!(
        after.row(&mut ctx, 1)?,
        [Datum::Int(1), Datum::Int(1), Datum::Time(Timestamp(7))]
    );

    // `ts` is invisible to the caller, so what it passes and touches for it is ignored.
    during.update_record(
        &mut ctx,
        1,
        &[1.into(), 1.into(), Datum::Null],
        &[1.into(), 2.into(), Datum::Null],
        &[false, true, true],
    )?;
    assert_eq!(
        after.row(&mut ctx, 1)?,
        [Datum::Int(1), Datum::Int(2), Datum::Time(Timestamp(1_000))]
    );

    let index = &after.indices()[0];
    assert_eq!(index.exist(ctx.txn(), &[1.into(), Datum::Time(Timestamp(7))], 1)?, (false, None));
    assert_eq!(
        index.exist(ctx.txn(), &[2.into(), Datum::Time(Timestamp(1_000))], 1)?,
        (true, Some(1))
    );
    ctx.commit()?;
    Ok(())
}

#[test]
fn test_update_keeps_stored_write_only_values() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let [before, during, after] = add_column_versions(StorageOptions::default());
    let mut ctx = SimpleContext::new(store.begin());

    during.add_record(&mut ctx, &[1.into(), 5.into(), 999.into()])?;
    during.update_record(
        &mut ctx,
        1,
        &[1.into(), 5.into(), Datum::Null],
        &[1.into(), 6.into(), 123.into()],
        &[false, true, true],
    )?;
    assert_eq!(after.row(&mut ctx, 1)?, [Datum::Int(1), Datum::Int(6), Datum::Int(7)]);
    let idx_c = after.find_index_by_col_name("c").unwrap();
    assert_eq!(idx_c.exist(ctx.txn(), &[7.into()], 1)?, (true, Some(1)));
    assert_eq!(idx_c.exist(ctx.txn(), &[123.into()], 1)?, (false, None));

    // A row written before `c` existed doesn't get it from an update.
    before.add_record(&mut ctx, &[2.into(), 1.into()])?;
    during.update_record(
        &mut ctx,
        2,
        &[2.into(), 1.into(), Datum::Null],
        &[2.into(), 2.into(), Datum::Null],
        &[false, true, false],
    )?;
    assert!(after.row(&mut ctx, 2).unwrap_err().is_missing_value());
    Ok(())
}

#[test]
fn test_existence_hint_is_scoped_to_its_index() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let cols = vec![pk_col(), ColumnInfo::new(2, "a", 1, int()), ColumnInfo::new(3, "b", 2, int())];
    let before = TableInfo::new(11, "t", cols.clone())
        .with_pk_is_handle()
        .with_index(IndexInfo::new(1, "uk_a", &cols[1..2]).unique());
    let during = before
        .clone()
        .with_index(IndexInfo::new(2, "k_b", &cols[2..]).with_state(SchemaState::WriteOnly));
    let (before, during) = (Table::from_meta(alloc(), &before)?, Table::from_meta(alloc(), &during)?);
    let mut ctx = SimpleContext::new(store.begin());

    before.add_record(&mut ctx, &[1.into(), 10.into(), 20.into()])?;
    // `k_b` has no entry for the row yet; `uk_a` is rewritten right before it.
    during.update_record(
        &mut ctx,
        1,
        &[1.into(), 10.into(), 20.into()],
        &[1.into(), 11.into(), 21.into()],
        &[false, true, true],
    )?;

    // The missing entry was an ordinary miss: another transaction writing it is no conflict.
    let (missing, _) = during.indices()[1].gen_index_key(&[20.into()], 1);
    let mut other = store.begin();
    other.set(&missing, b"0")?;
    other.commit()?;
    ctx.commit()?;
    Ok(())
}

#[test]
fn test_unsigned_handle_column() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let cols = vec![
        ColumnInfo::new(
            1,
            "id",
            0,
            int().with_flags(ColumnFlags::PRI_KEY | ColumnFlags::NOT_NULL | ColumnFlags::UNSIGNED),
        ),
        ColumnInfo::new(2, "name", 1, FieldType::new(TypeKind::Varchar)),
    ];
    let table = Table::from_meta(alloc(), &TableInfo::new(12, "t", cols).with_pk_is_handle())?;
    let mut ctx = SimpleContext::new(store.begin());

    assert_eq!(table.add_record(&mut ctx, &[Datum::Uint(5), "x".into()])?, 5);
    assert_eq!(table.add_record(&mut ctx, &[Datum::Null, "y".into()])?, 1);
    assert_eq!(table.row(&mut ctx, 5)?, [Datum::Uint(5), Datum::from("x")]);
    // The id lives in the handle only.
    assert_eq!(
        keys(ctx.txn(), table.record_prefix()),
        [
            table.record_key(1, ROW_LOCK_COL_ID),
            table.record_key(1, ColId(2)),
            table.record_key(5, ROW_LOCK_COL_ID),
            table.record_key(5, ColId(2)),
        ]
    );

    let mut ids = Vec::new();
    table.iter_records(&mut ctx, &table.first_key(), table.cols(), |_, data, _| {
        ids.push(data[0].clone());
        Ok(true)
    })?;
    assert_eq!(ids, [Datum::Uint(1), Datum::Uint(5)]);
    Ok(())
}

#[test]
fn test_reorganization_states() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let cols = vec![
        pk_col(),
        ColumnInfo::new(2, "a", 1, int()),
        ColumnInfo::new(3, "w", 2, int())
            .with_default(DefaultValue::Literal(3.into()))
            .with_state(SchemaState::WriteReorganization),
        ColumnInfo::new(4, "d", 3, int()).with_state(SchemaState::DeleteReorganization),
    ];
    let meta = TableInfo::new(13, "t", cols.clone())
        .with_pk_is_handle()
        .with_index(IndexInfo::new(1, "idx_w", &cols[2..3]).with_state(SchemaState::WriteReorganization))
        .with_index(IndexInfo::new(2, "idx_d", &cols[3..]).with_state(SchemaState::DeleteReorganization));
    let table = Table::from_meta(alloc(), &meta)?;
    let (idx_w, idx_d) = (&table.indices()[0], &table.indices()[1]);
    let mut ctx = SimpleContext::new(store.begin());

    let names: Vec<_> = table.cols().iter().map(|c| &*c.name).collect();
    assert_eq!(names, ["id", "a"]);
    assert!(table.find_index_by_col_name("w").is_none());

    // `w` is written with its default, `d` not at all.
    table.add_record(&mut ctx, &[1.into(), 2.into(), 99.into(), 99.into()])?;
    assert_eq!(
        keys(ctx.txn(), table.record_prefix()),
        [
            table.record_key(1, ROW_LOCK_COL_ID),
            table.record_key(1, ColId(2)),
            table.record_key(1, ColId(3)),
        ]
    );
    assert_eq!(idx_w.exist(ctx.txn(), &[3.into()], 1)?, (true, Some(1)));
    assert_eq!(idx_d.exist(ctx.txn(), &[99.into()], 1)?, (false, None));
    assert!(
        table
            .row_with_cols(&mut ctx, 1, &table.meta().columns[2..3])
            .unwrap_err()
            .is_column_state_non_public()
    );

    table.remove_record(&mut ctx, 1, &[1.into(), 2.into(), 3.into(), 99.into()])?;
    assert!(keys(ctx.txn(), table.record_prefix()).is_empty());
    assert!(keys(ctx.txn(), table.index_prefix()).is_empty());
    Ok(())
}

#[test]
fn test_delete_only_index_is_not_written() -> ResultTest<()> {
    let store = MemStore::new();
    let cols = vec![pk_col(), ColumnInfo::new(2, "a", 1, int())];
    let meta = TableInfo::new(7, "t", cols.clone())
        .with_pk_is_handle()
        .with_index(IndexInfo::new(1, "idx_a", &cols[1..]).with_state(SchemaState::DeleteOnly));
    let table = Table::from_meta(alloc(), &meta)?;
    let mut ctx = SimpleContext::new(store.begin());

    table.add_record(&mut ctx, &[1.into(), 5.into()])?;
    assert!(keys(ctx.txn(), table.index_prefix()).is_empty());
    assert!(table.find_index_by_col_name("a").is_none());
    table.remove_record(&mut ctx, 1, &[1.into(), 5.into()])?;
    Ok(())
}

#[test]
fn test_scan_visits_rows_in_handle_order() -> ResultTest<()> {
    init_log();
    let store = MemStore::new();
    let cols = vec![
        ColumnInfo::new(1, "a", 0, int()),
        ColumnInfo::new(2, "b", 1, FieldType::new(TypeKind::Varchar)),
    ];
    let table = Table::from_meta(alloc(), &TableInfo::new(8, "t", cols))?;
    let mut ctx = SimpleContext::new(store.begin());

    let mut handles = Vec::new();
    for i in 0..20 {
        handles.push(table.add_record(&mut ctx, &[i.into(), format!("row {i}").into()])?);
    }
    ctx.commit()?;
    let mut ctx = SimpleContext::new(store.begin());

    let mut seen = Vec::new();
    table.iter_records(&mut ctx, &table.first_key(), table.cols(), |h, data, cols| {
        assert_eq!(cols.len(), 2);
        assert_eq!(data[1], Datum::String(format!("row {}", seen.len())));
        seen.push(h);
        Ok(true)
    })?;
    assert_eq!(seen, handles);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));

    let mut calls = 0;
    table.iter_records(&mut ctx, &table.record_key(handles[5], ROW_LOCK_COL_ID), table.cols(), |_, _, _| {
        calls += 1;
        Ok(calls < 3)
    })?;
    assert_eq!(calls, 3);

    table.remove_record(&mut ctx, handles[5], &[5.into(), "row 5".into()])?;
    assert_eq!(table.seek(&mut ctx, handles[5])?, Some(handles[6]));
    assert_eq!(table.seek(&mut ctx, handles[19] + 1)?, None);
    Ok(())
}

#[test]
fn test_truncate_clears_rows_and_indices() -> ResultTest<()> {
    let store = MemStore::new();
    let table = id_name_table();
    let mut ctx = SimpleContext::new(store.begin());
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        table.add_record(&mut ctx, &[id.into(), name.into()])?;
    }
    ctx.commit()?;

    let mut ctx = SimpleContext::new(store.begin());
    table.truncate(&mut ctx)?;
    ctx.commit()?;
    assert!(store.scan_prefix(table.record_prefix()).is_empty());
    assert!(store.scan_prefix(table.index_prefix()).is_empty());
    Ok(())
}

#[test]
fn test_row_locks() -> ResultTest<()> {
    let store = MemStore::new();
    let table = id_name_table();
    let mut ctx = SimpleContext::new(store.begin());
    table.add_record(&mut ctx, &[1.into(), "a".into()])?;
    ctx.commit()?;

    let mut writer = SimpleContext::new(store.begin());
    table.lock_row(&mut writer, 1, false)?;
    let desc = writer.txn().to_string();
    assert_eq!(writer.txn().get(&table.record_key(1, ROW_LOCK_COL_ID))?, desc.into_bytes());

    // A read lock conflicts with a concurrent write of the row.
    let mut reader = SimpleContext::new(store.begin());
    table.lock_row(&mut reader, 1, true)?;
    writer.commit()?;
    assert!(matches!(reader.commit(), Err(KvError::WriteConflict { .. })));
    Ok(())
}

#[test]
fn test_row_of_bad_length_is_rejected() {
    let store = MemStore::new();
    let table = id_name_table();
    let mut ctx = SimpleContext::new(store.begin());
    let err = table.add_record(&mut ctx, &[1.into()]).unwrap_err();
    assert!(matches!(err, TableError::RowLength { expected: 2, found: 1 }));
}

fn all_types_table() -> Table {
    let cols = vec![
        ColumnInfo::new(1, "i", 0, int()),
        ColumnInfo::new(2, "u", 1, int().with_flags(ColumnFlags::UNSIGNED)),
        ColumnInfo::new(3, "f", 2, FieldType::new(TypeKind::Float)),
        ColumnInfo::new(4, "s", 3, FieldType::new(TypeKind::Varchar)),
        ColumnInfo::new(5, "b", 4, FieldType::new(TypeKind::Blob)),
        ColumnInfo::new(6, "t", 5, FieldType::new(TypeKind::Timestamp)),
    ];
    let meta = TableInfo::new(9, "all_types", cols.clone()).with_index(IndexInfo::new(1, "idx_s_i", [&cols[3], &cols[0]]));
    Table::from_meta(alloc(), &meta).unwrap()
}

fn gen_row() -> impl Strategy<Value = Vec<Datum>> {
    (
        any::<Option<i64>>(),
        any::<Option<u64>>(),
        proptest::option::of(-1e12f64..1e12),
        any::<Option<String>>(),
        any::<Option<Vec<u8>>>(),
        any::<Option<i64>>(),
    )
        .prop_map(|(i, u, f, s, b, t)| {
            vec![
                Datum::from(i),
                Datum::from(u),
                Datum::from(f),
                Datum::from(s),
                Datum::from(b),
                Datum::from(t.map(Timestamp)),
            ]
        })
}

proptest! {
    #[test]
    fn row_round_trips(rows in proptest::collection::vec(gen_row(), 1..8)) {
        let store = MemStore::new();
        let table = all_types_table();
        let mut ctx = SimpleContext::new(store.begin());

        let handles = rows
            .iter()
            .map(|row| table.add_record(&mut ctx, row))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        for (handle, row) in handles.iter().zip(&rows) {
            prop_assert_eq!(&table.row(&mut ctx, *handle).unwrap(), row);
        }

        let index = &table.indices()[0];
        let mut indexed = index
            .seek_first(ctx.txn())
            .unwrap()
            .map(|e| e.unwrap().1)
            .collect::<Vec<_>>();
        indexed.sort();
        prop_assert_eq!(indexed, handles.clone());

        for (handle, row) in handles.iter().zip(&rows) {
            table.remove_record(&mut ctx, *handle, row).unwrap();
        }
        prop_assert!(keys(ctx.txn(), table.record_prefix()).is_empty());
        prop_assert!(keys(ctx.txn(), table.index_prefix()).is_empty());
    }
}
