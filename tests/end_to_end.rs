//! End-to-end scenarios against the catalog/executor surface (§8), driven
//! directly through `SystemManager` since SQL parsing is an external
//! collaborator this crate does not implement.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};

use dbcore::buffer::BufferPoolManager;
use dbcore::catalog::{ColumnDef, CompareOp, ForeignKeyDef, SearchConstraint, SystemManager};
use dbcore::record::{ColumnType, DataValue};
use tempfile::tempdir;

// `SystemManager` resolves paths relative to the process cwd (`./data/...`,
// §6), so every test in this binary must serialize its `set_current_dir`
// call against the others.
static CWD_LOCK: Mutex<()> = Mutex::new(());

fn system_in(dir: &std::path::Path) -> (MutexGuard<'static, ()>, SystemManager) {
    let guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    std::env::set_current_dir(dir).unwrap();
    (guard, SystemManager::new().unwrap())
}

fn system_with_shared_pool(dir: &std::path::Path) -> (MutexGuard<'static, ()>, Rc<RefCell<BufferPoolManager>>, SystemManager) {
    let guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    std::env::set_current_dir(dir).unwrap();
    let bpm = Rc::new(RefCell::new(BufferPoolManager::new()));
    let sys = SystemManager::with_buffer_pool(bpm.clone()).unwrap();
    (guard, bpm, sys)
}

fn int(v: i32) -> DataValue {
    DataValue::Int { value: v, is_null: false }
}

fn varchar(v: &str) -> DataValue {
    DataValue::Varchar { value: v.to_string(), is_null: false }
}

/// Scenario 1: create a database, a table, insert rows, select them back.
#[test]
fn create_database_and_insert() {
    let dir = tempdir().unwrap();
    let (_guard, mut sys) = system_in(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    sys.create_table(
        "t",
        vec![ColumnDef::new("id", ColumnType::Int).not_null(), ColumnDef::new("s", ColumnType::Varchar(8))],
        vec![],
    )
    .unwrap();
    sys.add_primary_key("t", &["id".to_string()]).unwrap();

    sys.insert_into_table("t", vec![vec![int(1), varchar("a")], vec![int(2), varchar("b")]]).unwrap();

    let rows = sys.search("t", vec![], &[]).unwrap();
    assert_eq!(rows.len(), 2);
    let mut pairs: Vec<(i32, String)> =
        rows.iter().map(|r| (as_int(r.get(0).unwrap()), r.get(1).unwrap().to_string())).collect();
    pairs.sort();
    assert_eq!(pairs, vec![(1, "a".to_string()), (2, "b".to_string())]);
}

/// Scenario 2: a duplicate primary key is rejected and the row count is
/// unaffected.
#[test]
fn duplicate_primary_key_rejected() {
    let dir = tempdir().unwrap();
    let (_guard, mut sys) = system_in(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    sys.create_table(
        "t",
        vec![ColumnDef::new("id", ColumnType::Int).not_null(), ColumnDef::new("s", ColumnType::Varchar(8))],
        vec![],
    )
    .unwrap();
    sys.add_primary_key("t", &["id".to_string()]).unwrap();
    sys.insert_into_table("t", vec![vec![int(1), varchar("a")], vec![int(2), varchar("b")]]).unwrap();

    let err = sys.insert_into_table("t", vec![vec![int(1), varchar("c")]]);
    assert!(err.is_err());
    assert_eq!(sys.search("t", vec![], &[]).unwrap().len(), 2);
}

/// Scenario 3: foreign key enforcement on insert, and a referenced table
/// cannot be dropped while it is still referenced.
#[test]
fn foreign_key_enforcement() {
    let dir = tempdir().unwrap();
    let (_guard, mut sys) = system_in(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    sys.create_table("t", vec![ColumnDef::new("id", ColumnType::Int).not_null()], vec![]).unwrap();
    sys.add_primary_key("t", &["id".to_string()]).unwrap();
    sys.insert_into_table("t", vec![vec![int(1)], vec![int(2)]]).unwrap();

    sys.create_table(
        "u",
        vec![ColumnDef::new("fid", ColumnType::Int)],
        vec![ForeignKeyDef { local_columns: vec!["fid".to_string()], ref_table: "t".to_string(), ref_columns: vec!["id".to_string()] }],
    )
    .unwrap();

    sys.insert_into_table("u", vec![vec![int(1)]]).unwrap();
    assert!(sys.insert_into_table("u", vec![vec![int(99)]]).is_err());
    assert!(sys.drop_table("t").is_err());
}

/// Scenario 4: an equality/range query over an indexed integer column
/// fetches strictly fewer pages than a full table scan over the same data.
#[test]
fn index_range_scan_fetches_fewer_pages_than_full_scan() {
    let dir = tempdir().unwrap();
    let (_guard, bpm, mut sys) = system_with_shared_pool(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    // A wide filler column keeps the heap slot large so 1000 rows spread
    // across many heap pages, which is what makes an index traversal
    // (a handful of tree pages plus the few heap pages the matches land
    // on) cheaper than walking every heap page.
    sys.create_table(
        "t",
        vec![ColumnDef::new("k", ColumnType::Int).not_null(), ColumnDef::new("filler", ColumnType::Varchar(1024))],
        vec![],
    )
    .unwrap();

    let filler = "x".repeat(1024);
    let rows: Vec<Vec<DataValue>> = (1..=1000).map(|k| vec![int(k), varchar(&filler)]).collect();
    sys.insert_into_table("t", rows).unwrap();
    sys.add_index("t", &["k".to_string()], None).unwrap();

    bpm.borrow().stats.reset();
    let constraint = SearchConstraint::new(0, ColumnType::Int)
        .with(CompareOp::Geq, int(250))
        .with(CompareOp::Leq, int(260));
    let indexed = sys.search("t", vec![constraint], &[]).unwrap();
    assert_eq!(indexed.len(), 11);
    let indexed_fetches = bpm.borrow().stats.fetches();

    bpm.borrow().stats.reset();
    let full = sys.search("t", vec![], &[]).unwrap();
    assert_eq!(full.len(), 1000);
    let full_fetches = bpm.borrow().stats.fetches();

    assert!(indexed_fetches < full_fetches, "indexed={indexed_fetches} full={full_fetches}");
}

/// Scenario 5: updating an indexed column removes the old index entry and
/// adds the new one.
#[test]
fn update_maintains_index() {
    let dir = tempdir().unwrap();
    let (_guard, mut sys) = system_in(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    sys.create_table("t", vec![ColumnDef::new("k", ColumnType::Int).not_null()], vec![]).unwrap();
    let rows: Vec<Vec<DataValue>> = (1..=1000).map(|k| vec![int(k)]).collect();
    sys.insert_into_table("t", rows).unwrap();
    sys.add_index("t", &["k".to_string()], None).unwrap();

    let eq = |v: i32| SearchConstraint::new(0, ColumnType::Int).with(CompareOp::Eq, int(v));
    sys.update_rows("t", vec![("k".to_string(), int(5000))], vec![eq(500)]).unwrap();

    assert!(sys.search("t", vec![eq(500)], &[]).unwrap().is_empty());
    let updated = sys.search("t", vec![eq(5000)], &[]).unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(as_int(updated[0].get(0).unwrap()), 5000);
}

/// Scenario 6: delete all rows then bulk-load a CSV; every declared index
/// ends up with exactly as many entries as live rows.
#[test]
fn delete_then_bulk_reload_keeps_indexes_consistent() {
    let dir = tempdir().unwrap();
    let (_guard, mut sys) = system_in(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    sys.create_table(
        "t",
        vec![ColumnDef::new("id", ColumnType::Int).not_null(), ColumnDef::new("name", ColumnType::Varchar(16))],
        vec![],
    )
    .unwrap();
    sys.add_primary_key("t", &["id".to_string()]).unwrap();
    sys.insert_into_table("t", vec![vec![int(1), varchar("x")]]).unwrap();

    let all = sys.search("t", vec![], &[]).unwrap();
    let deleted = sys.delete_rows("t", vec![]).unwrap();
    assert_eq!(deleted, all.len());
    assert!(sys.search("t", vec![], &[]).unwrap().is_empty());

    let csv_path = dir.path().join("bulk.csv");
    let csv = (0..100).map(|i| format!("{i},row{i}")).collect::<Vec<_>>().join("\n");
    std::fs::write(&csv_path, csv + "\n").unwrap();
    let loaded = sys.load_csv_into_table("t", &csv_path, ',').unwrap();
    assert_eq!(loaded, 100);

    let rows = sys.search("t", vec![], &[]).unwrap();
    assert_eq!(rows.len(), 100);

    // every declared index (here, the primary key index) enumerates
    // exactly as many entries as live rows.
    for id in 0..100 {
        let hit = sys.search("t", vec![SearchConstraint::new(0, ColumnType::Int).with(CompareOp::Eq, int(id))], &[]).unwrap();
        assert_eq!(hit.len(), 1, "missing index entry for id {id}");
    }
}

/// An unreferenced row in a dominated table may still be deleted; a row
/// with a live child row pointing at it may not.
#[test]
fn delete_rows_refuses_only_referenced_rows() {
    let dir = tempdir().unwrap();
    let (_guard, mut sys) = system_in(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    sys.create_table("t", vec![ColumnDef::new("id", ColumnType::Int).not_null()], vec![]).unwrap();
    sys.add_primary_key("t", &["id".to_string()]).unwrap();
    sys.insert_into_table("t", vec![vec![int(1)], vec![int(2)]]).unwrap();

    sys.create_table(
        "u",
        vec![ColumnDef::new("fid", ColumnType::Int)],
        vec![ForeignKeyDef { local_columns: vec!["fid".to_string()], ref_table: "t".to_string(), ref_columns: vec!["id".to_string()] }],
    )
    .unwrap();
    sys.insert_into_table("u", vec![vec![int(1)]]).unwrap();

    let eq = |v: i32| SearchConstraint::new(0, ColumnType::Int).with(CompareOp::Eq, int(v));

    // id=2 has no child row in u and must be deletable.
    let deleted = sys.delete_rows("t", vec![eq(2)]).unwrap();
    assert_eq!(deleted, 1);
    assert!(sys.search("t", vec![eq(2)], &[]).unwrap().is_empty());

    // id=1 is still referenced by u.fid=1 and must be refused.
    assert!(sys.delete_rows("t", vec![eq(1)]).is_err());
    assert_eq!(sys.search("t", vec![eq(1)], &[]).unwrap().len(), 1);
}

/// Updating a column that is not part of any dominance edge is always
/// allowed; changing a referenced primary key value is only refused when
/// a dominating row still points at the old value.
#[test]
fn update_rows_refuses_only_when_referenced_value_changes() {
    let dir = tempdir().unwrap();
    let (_guard, mut sys) = system_in(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    sys.create_table(
        "t",
        vec![ColumnDef::new("id", ColumnType::Int).not_null(), ColumnDef::new("s", ColumnType::Varchar(8))],
        vec![],
    )
    .unwrap();
    sys.add_primary_key("t", &["id".to_string()]).unwrap();
    sys.insert_into_table("t", vec![vec![int(1), varchar("a")], vec![int(2), varchar("b")]]).unwrap();

    sys.create_table(
        "u",
        vec![ColumnDef::new("fid", ColumnType::Int)],
        vec![ForeignKeyDef { local_columns: vec!["fid".to_string()], ref_table: "t".to_string(), ref_columns: vec!["id".to_string()] }],
    )
    .unwrap();
    sys.insert_into_table("u", vec![vec![int(1)]]).unwrap();

    let eq = |v: i32| SearchConstraint::new(0, ColumnType::Int).with(CompareOp::Eq, int(v));

    // unrelated column, unreferenced id: always fine.
    sys.update_rows("t", vec![("s".to_string(), varchar("z"))], vec![eq(2)]).unwrap();
    // unrelated column on the referenced row is also fine.
    sys.update_rows("t", vec![("s".to_string(), varchar("q"))], vec![eq(1)]).unwrap();

    // changing the referenced id of an unreferenced row succeeds.
    sys.update_rows("t", vec![("id".to_string(), int(20))], vec![eq(2)]).unwrap();
    assert!(sys.search("t", vec![eq(2)], &[]).unwrap().is_empty());

    // changing the referenced id of a row with a live child is refused.
    assert!(sys.update_rows("t", vec![("id".to_string(), int(10))], vec![eq(1)]).is_err());
    assert_eq!(sys.search("t", vec![eq(1)], &[]).unwrap().len(), 1);
}

/// `create_table`'s FK declaration installs an index over the local FK
/// columns, matching the primary-key and per-FK defaults (§4.6).
#[test]
fn foreign_key_declaration_creates_local_index() {
    let dir = tempdir().unwrap();
    let (_guard, mut sys) = system_in(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    sys.create_table("t", vec![ColumnDef::new("id", ColumnType::Int).not_null()], vec![]).unwrap();
    sys.add_primary_key("t", &["id".to_string()]).unwrap();
    sys.insert_into_table("t", vec![vec![int(1)]]).unwrap();

    sys.create_table(
        "u",
        vec![ColumnDef::new("fid", ColumnType::Int)],
        vec![ForeignKeyDef { local_columns: vec!["fid".to_string()], ref_table: "t".to_string(), ref_columns: vec!["id".to_string()] }],
    )
    .unwrap();

    let meta = sys.describe_table("u").unwrap();
    assert!(meta.indexes.iter().any(|i| i.columns == vec![0]), "expected an index over fid (column 0)");
}

/// Index columns are restricted to INT; creating a unique constraint over
/// a FLOAT column is rejected rather than silently building an index with
/// non order-preserving keys.
#[test]
fn non_int_columns_cannot_be_indexed() {
    let dir = tempdir().unwrap();
    let (_guard, mut sys) = system_in(dir.path());

    sys.create_database("db1").unwrap();
    sys.use_database("db1").unwrap();
    sys.create_table("t", vec![ColumnDef::new("f", ColumnType::Float)], vec![]).unwrap();

    assert!(sys.add_unique("t", "f").is_err());
    assert!(sys.add_index("t", &["f".to_string()], None).is_err());
}

fn as_int(v: &DataValue) -> i32 {
    match v {
        DataValue::Int { value, .. } => *value,
        _ => panic!("expected INT value"),
    }
}
