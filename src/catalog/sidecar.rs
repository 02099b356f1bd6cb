//! Fixed schemas for the catalog's sidecar record files (§6): `ALLDatabase`,
//! `ALLTable`, `PrimaryKey`, `ForeignKey`, `Dominate`, and `IndexInfo`.
//!
//! Unlike a user table, these schemas are never declared by a caller — they
//! are baked in here, one column vector per file kind, grounded on
//! `original_source/system/SystemManager.cpp`'s fixed-width bookkeeping
//! records. Foreign keys and indexes are capped at
//! [`FOREIGN_KEY_MAX_NUM`]/[`INDEX_KEY_MAX_NUM`] columns, matching the
//! fixed-width `fk_col_N`/`idx_col_N` slots the source reserves rather than
//! a variable-length encoding.

use crate::common::config::{FOREIGN_KEY_MAX_NUM, INDEX_KEY_MAX_NUM};
use crate::record::{Column, ColumnType, DataValue};

const NAME_MAX_LEN: u16 = 128;

fn col(id: i32, name: &str, ty: ColumnType) -> Column {
    Column { id, name: name.into(), ty, not_null: false, unique: false, default: None }
}

/// `ALLDatabase` / `ALLTable`: one row per database (or per table within a
/// database), just a name. The record's `data_id` doubles as the
/// database/table id (§4.6 "Table/database ids").
pub fn name_schema() -> Vec<Column> {
    vec![col(0, "name", ColumnType::Varchar(NAME_MAX_LEN))]
}

pub fn name_row(name: &str) -> Vec<(i32, DataValue)> {
    vec![(0, DataValue::Varchar { value: name.to_string(), is_null: false })]
}

pub fn name_from_row(values: &[(i32, DataValue)]) -> Option<String> {
    values.iter().find(|(id, _)| *id == 0).and_then(|(_, v)| match v {
        DataValue::Varchar { value, is_null: false } => Some(value.clone()),
        _ => None,
    })
}

/// `PrimaryKey`: at most one row, since a table has at most one primary
/// key. `column_count` then `pk_col_0..9`, unused slots left null.
pub fn primary_key_schema() -> Vec<Column> {
    let mut columns = vec![col(0, "column_count", ColumnType::Int)];
    for i in 0..FOREIGN_KEY_MAX_NUM {
        columns.push(col(1 + i as i32, &format!("pk_col_{i}"), ColumnType::Int));
    }
    columns
}

pub fn primary_key_row(column_ids: &[i32]) -> Vec<(i32, DataValue)> {
    let mut row = vec![(0, DataValue::Int { value: column_ids.len() as i32, is_null: false })];
    for i in 0..FOREIGN_KEY_MAX_NUM {
        let value = match column_ids.get(i) {
            Some(&id) => DataValue::Int { value: id, is_null: false },
            None => DataValue::null_int(),
        };
        row.push((1 + i as i32, value));
    }
    row
}

pub fn primary_key_from_row(values: &[(i32, DataValue)]) -> Vec<i32> {
    let count = int_at(values, 0).unwrap_or(0) as usize;
    (0..count.min(FOREIGN_KEY_MAX_NUM))
        .filter_map(|i| int_at(values, 1 + i as i32))
        .collect()
}

/// `ForeignKey`: one row per declared foreign key edge. `fk_col_0..9` are
/// this table's local columns; `ref_col_0..9` the referenced table's
/// columns, in the same order.
pub fn foreign_key_schema() -> Vec<Column> {
    let mut columns = vec![
        col(0, "column_count", ColumnType::Int),
        col(1, "ref_table_id", ColumnType::Int),
        col(2, "ref_table_name", ColumnType::Varchar(NAME_MAX_LEN)),
    ];
    let base = columns.len() as i32;
    for i in 0..FOREIGN_KEY_MAX_NUM {
        columns.push(col(base + i as i32, &format!("fk_col_{i}"), ColumnType::Int));
    }
    let base = columns.len() as i32;
    for i in 0..FOREIGN_KEY_MAX_NUM {
        columns.push(col(base + i as i32, &format!("ref_col_{i}"), ColumnType::Int));
    }
    columns
}

pub struct ForeignKeyRow {
    pub ref_table_id: i32,
    pub ref_table_name: String,
    pub local_columns: Vec<i32>,
    pub ref_columns: Vec<i32>,
}

pub fn foreign_key_row(row: &ForeignKeyRow) -> Vec<(i32, DataValue)> {
    let mut values = vec![
        (0, DataValue::Int { value: row.local_columns.len() as i32, is_null: false }),
        (1, DataValue::Int { value: row.ref_table_id, is_null: false }),
        (2, DataValue::Varchar { value: row.ref_table_name.clone(), is_null: false }),
    ];
    for i in 0..FOREIGN_KEY_MAX_NUM {
        let v = match row.local_columns.get(i) {
            Some(&id) => DataValue::Int { value: id, is_null: false },
            None => DataValue::null_int(),
        };
        values.push((3 + i as i32, v));
    }
    for i in 0..FOREIGN_KEY_MAX_NUM {
        let v = match row.ref_columns.get(i) {
            Some(&id) => DataValue::Int { value: id, is_null: false },
            None => DataValue::null_int(),
        };
        values.push((3 + FOREIGN_KEY_MAX_NUM as i32 + i as i32, v));
    }
    values
}

pub fn foreign_key_from_row(values: &[(i32, DataValue)]) -> ForeignKeyRow {
    let count = int_at(values, 0).unwrap_or(0) as usize;
    let ref_table_id = int_at(values, 1).unwrap_or(-1);
    let ref_table_name = values
        .iter()
        .find(|(id, _)| *id == 2)
        .and_then(|(_, v)| match v {
            DataValue::Varchar { value, is_null: false } => Some(value.clone()),
            _ => None,
        })
        .unwrap_or_default();
    let local_columns = (0..count.min(FOREIGN_KEY_MAX_NUM))
        .filter_map(|i| int_at(values, 3 + i as i32))
        .collect();
    let ref_columns = (0..count.min(FOREIGN_KEY_MAX_NUM))
        .filter_map(|i| int_at(values, 3 + FOREIGN_KEY_MAX_NUM as i32 + i as i32))
        .collect();
    ForeignKeyRow { ref_table_id, ref_table_name, local_columns, ref_columns }
}

/// `Dominate`: the reverse side of `ForeignKey`, one row per table that
/// holds a foreign key into this one. Lets `drop_table`/`delete_rows`
/// reject an operation that would orphan a dependent row without having
/// to scan every other table's `ForeignKey` file (§4.6 `Non-goals` keeps
/// this O(1)-per-check by maintaining the reverse index eagerly).
pub fn dominate_schema() -> Vec<Column> {
    let mut columns = vec![
        col(0, "column_count", ColumnType::Int),
        col(1, "dominating_table_id", ColumnType::Int),
    ];
    let base = columns.len() as i32;
    for i in 0..FOREIGN_KEY_MAX_NUM {
        columns.push(col(base + i as i32, &format!("dom_col_{i}"), ColumnType::Int));
    }
    columns
}

pub fn dominate_row(dominating_table_id: i32, ref_columns: &[i32]) -> Vec<(i32, DataValue)> {
    let mut values = vec![
        (0, DataValue::Int { value: ref_columns.len() as i32, is_null: false }),
        (1, DataValue::Int { value: dominating_table_id, is_null: false }),
    ];
    for i in 0..FOREIGN_KEY_MAX_NUM {
        let v = match ref_columns.get(i) {
            Some(&id) => DataValue::Int { value: id, is_null: false },
            None => DataValue::null_int(),
        };
        values.push((2 + i as i32, v));
    }
    values
}

pub fn dominate_from_row(values: &[(i32, DataValue)]) -> (i32, Vec<i32>) {
    let count = int_at(values, 0).unwrap_or(0) as usize;
    let dominating_table_id = int_at(values, 1).unwrap_or(-1);
    let columns = (0..count.min(FOREIGN_KEY_MAX_NUM))
        .filter_map(|i| int_at(values, 2 + i as i32))
        .collect();
    (dominating_table_id, columns)
}

/// `IndexInfo`: one row per declared index. `index_name` is null for an
/// index created implicitly (e.g. by `add_unique`, §4.6 `add_index`
/// supplement), in which case a later `add_index` naming the same column
/// tuple renames this row in place rather than creating a duplicate tree.
pub fn index_info_schema() -> Vec<Column> {
    let mut columns = vec![
        col(0, "column_count", ColumnType::Int),
        col(1, "index_name", ColumnType::Varchar(NAME_MAX_LEN)),
    ];
    let base = columns.len() as i32;
    for i in 0..INDEX_KEY_MAX_NUM {
        columns.push(col(base + i as i32, &format!("idx_col_{i}"), ColumnType::Int));
    }
    columns
}

pub struct IndexInfoRow {
    pub name: Option<String>,
    pub columns: Vec<i32>,
}

pub fn index_info_row(row: &IndexInfoRow) -> Vec<(i32, DataValue)> {
    let mut values = vec![
        (0, DataValue::Int { value: row.columns.len() as i32, is_null: false }),
        (
            1,
            match &row.name {
                Some(n) => DataValue::Varchar { value: n.clone(), is_null: false },
                None => DataValue::null_varchar(),
            },
        ),
    ];
    for i in 0..INDEX_KEY_MAX_NUM {
        let v = match row.columns.get(i) {
            Some(&id) => DataValue::Int { value: id, is_null: false },
            None => DataValue::null_int(),
        };
        values.push((2 + i as i32, v));
    }
    values
}

pub fn index_info_from_row(values: &[(i32, DataValue)]) -> IndexInfoRow {
    let count = int_at(values, 0).unwrap_or(0) as usize;
    let name = values.iter().find(|(id, _)| *id == 1).and_then(|(_, v)| match v {
        DataValue::Varchar { value, is_null: false } => Some(value.clone()),
        _ => None,
    });
    let columns = (0..count.min(INDEX_KEY_MAX_NUM))
        .filter_map(|i| int_at(values, 2 + i as i32))
        .collect();
    IndexInfoRow { name, columns }
}

fn int_at(values: &[(i32, DataValue)], column_id: i32) -> Option<i32> {
    values.iter().find(|(id, _)| *id == column_id).and_then(|(_, v)| match v {
        DataValue::Int { value, is_null: false } => Some(*value),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_row_roundtrips() {
        let row = primary_key_row(&[2, 0, 5]);
        assert_eq!(primary_key_from_row(&row), vec![2, 0, 5]);
    }

    #[test]
    fn foreign_key_row_roundtrips() {
        let fk = ForeignKeyRow {
            ref_table_id: 3,
            ref_table_name: "parent".into(),
            local_columns: vec![1, 2],
            ref_columns: vec![0, 1],
        };
        let row = foreign_key_row(&fk);
        let back = foreign_key_from_row(&row);
        assert_eq!(back.ref_table_id, 3);
        assert_eq!(back.ref_table_name, "parent");
        assert_eq!(back.local_columns, vec![1, 2]);
        assert_eq!(back.ref_columns, vec![0, 1]);
    }

    #[test]
    fn index_info_row_roundtrips_unnamed() {
        let info = IndexInfoRow { name: None, columns: vec![4] };
        let row = index_info_row(&info);
        let back = index_info_from_row(&row);
        assert!(back.name.is_none());
        assert_eq!(back.columns, vec![4]);
    }

    #[test]
    fn name_row_roundtrips() {
        let row = name_row("shop");
        assert_eq!(name_from_row(&row), Some("shop".to_string()));
    }
}
