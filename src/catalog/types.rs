//! DDL/DML input types and the loaded view of a table's catalog state
//! (§4.6), grounded on `original_source/system/SystemManager` and
//! `system/SystemColumns`.

use crate::record::{Column, ColumnType, DataValue};

/// A column declaration as passed to `create_table`, before a column id is
/// assigned (§4.6 `create_table` step 1).
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<DataValue>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self { name: name.into(), ty, not_null: false, unique: false, default: None }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: DataValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// A foreign key declaration as passed to `create_table`/`add_foreign_key`,
/// by column name (resolved to ids once the referenced table is loaded).
#[derive(Debug, Clone)]
pub struct ForeignKeyDef {
    pub local_columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

/// A foreign key edge as loaded from the `ForeignKey` sidecar (§6), with
/// every column resolved to its stable column id.
#[derive(Debug, Clone)]
pub struct ForeignKeyEntry {
    pub id: u32,
    pub local_columns: Vec<i32>,
    pub ref_table_id: i32,
    pub ref_table_name: String,
    pub ref_columns: Vec<i32>,
}

/// A declared index, as loaded from the `IndexInfo` sidecar (§6).
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: u32,
    pub columns: Vec<i32>,
    pub name: Option<String>,
}

/// One reverse-FK edge into this table, as loaded from the `Dominate`
/// sidecar (§6): some other table's foreign key targets `ref_columns` of
/// this table. Per-row dominance checks (`update_rows`/`delete_rows`,
/// §4.6) resolve `dominating_table_id`'s own `ForeignKey` sidecar to find
/// the matching local columns, then search its live rows for one whose
/// local columns equal this table's row's `ref_columns` values.
#[derive(Debug, Clone)]
pub struct DominanceEntry {
    pub dominating_table_id: i32,
    pub ref_columns: Vec<i32>,
}

/// The fully assembled catalog view of one table: schema plus every
/// sidecar file's contents (§4.6). Loaded fresh on each operation rather
/// than cached, since the executor is the sole writer and there is no
/// concurrent mutation to race against (§5).
#[derive(Debug, Clone)]
pub struct TableMeta {
    pub id: i32,
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Vec<i32>,
    pub foreign_keys: Vec<ForeignKeyEntry>,
    pub dominance: Vec<DominanceEntry>,
    pub indexes: Vec<IndexEntry>,
}

impl TableMeta {
    pub fn column(&self, id: i32) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_primary_key_column(&self, id: i32) -> bool {
        self.primary_key.contains(&id)
    }
}

/// A comparison operator in a search predicate (§4.6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Geq,
    Lt,
    Leq,
}

/// One column's accumulated predicates, as fed to the planner (§4.6.1).
/// Multiple `SearchConstraint`s on the same column are valid input; the
/// planner groups them by `column_id` before folding.
#[derive(Debug, Clone)]
pub struct SearchConstraint {
    pub column_id: i32,
    pub data_type: ColumnType,
    pub predicates: Vec<(CompareOp, DataValue)>,
}

impl SearchConstraint {
    pub fn new(column_id: i32, data_type: ColumnType) -> Self {
        Self { column_id, data_type, predicates: Vec::new() }
    }

    pub fn with(mut self, op: CompareOp, value: DataValue) -> Self {
        self.predicates.push((op, value));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_def_builder_sets_flags() {
        let c = ColumnDef::new("id", ColumnType::Int).not_null().unique();
        assert!(c.not_null);
        assert!(c.unique);
        assert_eq!(c.name, "id");
    }

    #[test]
    fn table_meta_looks_up_columns_by_name_and_id() {
        let meta = TableMeta {
            id: 0,
            name: "t".into(),
            columns: vec![Column { id: 0, name: "id".into(), ty: ColumnType::Int, not_null: true, unique: false, default: None }],
            primary_key: vec![0],
            foreign_keys: vec![],
            dominance: vec![],
            indexes: vec![],
        };
        assert!(meta.column(0).is_some());
        assert!(meta.column_by_name("id").is_some());
        assert!(meta.is_primary_key_column(0));
    }
}
