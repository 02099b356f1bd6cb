//! Typed values, columns, and records (§3, §4.4).
//!
//! Grounded on `original_source/record/DataType.hpp`: a value is a tagged
//! union over `{INT, FLOAT, VARCHAR, DATE}` that keeps its variant even when
//! null (a null `INT` column still type-checks as `INT`), and ordering is
//! defined so that a null sorts before every non-null value of the same
//! variant — this is what the planner's `nulls first` sort (§4.6.1 step 4)
//! relies on.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{DbError, Result};

/// A calendar date, compared lexicographically by `(year, month, day)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateValue {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// The declared type of a column, independent of any particular value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    /// Declared maximum length, in characters.
    Varchar(u16),
    Date,
}

impl ColumnType {
    /// Tag byte stored in the schema header's per-column metadata block.
    pub fn tag(self) -> u8 {
        match self {
            ColumnType::Int => 0,
            ColumnType::Float => 1,
            ColumnType::Varchar(_) => 2,
            ColumnType::Date => 3,
        }
    }

    /// Width in bytes of one slot's payload for this column, per §4.4:
    /// INT/DATE = 4, FLOAT = 8, VARCHAR = 2-byte length prefix plus
    /// character storage rounded so the total is a multiple of 4.
    pub fn payload_width(self) -> usize {
        match self {
            ColumnType::Int | ColumnType::Date => 4,
            ColumnType::Float => 8,
            ColumnType::Varchar(max_len) => {
                let raw = 2 * max_len as usize + 2;
                if raw % 4 == 0 {
                    raw
                } else {
                    raw + (4 - raw % 4)
                }
            }
        }
    }
}

/// A typed value, tagged even when null so a null `INT` column still
/// type-checks as `INT`. Floating-point `EQ`/`NEQ` is exact `==` — brittle
/// for computed floats, but this is the source's documented behavior and
/// the engine keeps it unchanged.
#[derive(Debug, Clone)]
pub enum DataValue {
    Int { value: i32, is_null: bool },
    Float { value: f64, is_null: bool },
    Varchar { value: String, is_null: bool },
    Date { value: DateValue, is_null: bool },
}

impl DataValue {
    pub fn null_int() -> Self {
        DataValue::Int { value: 0, is_null: true }
    }
    pub fn null_float() -> Self {
        DataValue::Float { value: 0.0, is_null: true }
    }
    pub fn null_varchar() -> Self {
        DataValue::Varchar { value: String::new(), is_null: true }
    }
    pub fn null_date() -> Self {
        DataValue::Date { value: DateValue { year: 0, month: 0, day: 0 }, is_null: true }
    }

    pub fn is_null(&self) -> bool {
        match self {
            DataValue::Int { is_null, .. }
            | DataValue::Float { is_null, .. }
            | DataValue::Varchar { is_null, .. }
            | DataValue::Date { is_null, .. } => *is_null,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            DataValue::Int { .. } => ColumnType::Int,
            DataValue::Float { .. } => ColumnType::Float,
            DataValue::Varchar { value, .. } => ColumnType::Varchar(value.len() as u16),
            DataValue::Date { .. } => ColumnType::Date,
        }
    }

    /// Same variant, ignoring the declared VARCHAR length.
    pub fn same_variant(&self, other: &DataValue) -> bool {
        matches!(
            (self, other),
            (DataValue::Int { .. }, DataValue::Int { .. })
                | (DataValue::Float { .. }, DataValue::Float { .. })
                | (DataValue::Varchar { .. }, DataValue::Varchar { .. })
                | (DataValue::Date { .. }, DataValue::Date { .. })
        )
    }
}

impl PartialEq for DataValue {
    fn eq(&self, other: &Self) -> bool {
        if self.is_null() || other.is_null() {
            return self.is_null() == other.is_null();
        }
        match (self, other) {
            (DataValue::Int { value: a, .. }, DataValue::Int { value: b, .. }) => a == b,
            (DataValue::Float { value: a, .. }, DataValue::Float { value: b, .. }) => a == b,
            (DataValue::Varchar { value: a, .. }, DataValue::Varchar { value: b, .. }) => a == b,
            (DataValue::Date { value: a, .. }, DataValue::Date { value: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for DataValue {
    /// Null sorts before every non-null value of the same variant (§4.4
    /// supplement): the planner's sort step and index key encoding both
    /// depend on this ordering.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Some(Ordering::Equal),
            (true, false) => return Some(Ordering::Less),
            (false, true) => return Some(Ordering::Greater),
            (false, false) => {}
        }
        match (self, other) {
            (DataValue::Int { value: a, .. }, DataValue::Int { value: b, .. }) => a.partial_cmp(b),
            (DataValue::Float { value: a, .. }, DataValue::Float { value: b, .. }) => {
                a.partial_cmp(b)
            }
            (DataValue::Varchar { value: a, .. }, DataValue::Varchar { value: b, .. }) => {
                a.partial_cmp(b)
            }
            (DataValue::Date { value: a, .. }, DataValue::Date { value: b, .. }) => {
                a.partial_cmp(b)
            }
            _ => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "NULL");
        }
        match self {
            DataValue::Int { value, .. } => write!(f, "{value}"),
            DataValue::Float { value, .. } => write!(f, "{value}"),
            DataValue::Varchar { value, .. } => write!(f, "{value}"),
            DataValue::Date { value, .. } => write!(f, "{value}"),
        }
    }
}

/// A column definition. Column ids are assigned at table creation in
/// declaration order and never renumbered (§3).
#[derive(Debug, Clone)]
pub struct Column {
    pub id: i32,
    pub name: String,
    pub ty: ColumnType,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<DataValue>,
}

/// `(page_id, slot_id)` address of a record within one heap file; stable
/// for a record's lifetime since updates are in-place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordLocation {
    pub page_id: u32,
    pub slot_id: u32,
}

impl fmt::Display for RecordLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot_id)
    }
}

/// An ordered list of typed values paired with their column ids, plus an
/// opaque monotonically increasing id assigned on insert. Equality
/// compares by column-id keyed values, so callers that built a `Record`
/// positionally must still get the same answer as one built out of order.
#[derive(Debug, Clone)]
pub struct Record {
    pub data_id: u32,
    pub values: Vec<(i32, DataValue)>,
}

impl Record {
    pub fn new(data_id: u32, values: Vec<(i32, DataValue)>) -> Self {
        Self { data_id, values }
    }

    pub fn get(&self, column_id: i32) -> Option<&DataValue> {
        self.values.iter().find(|(id, _)| *id == column_id).map(|(_, v)| v)
    }

    fn sorted_by_column(&self) -> Vec<(i32, &DataValue)> {
        let mut pairs: Vec<(i32, &DataValue)> = self.values.iter().map(|(id, v)| (*id, v)).collect();
        pairs.sort_by_key(|(id, _)| *id);
        pairs
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        let a = self.sorted_by_column();
        let b = other.sorted_by_column();
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b.iter()).all(|((ca, va), (cb, vb))| ca == cb && va == vb)
    }
}

/// The schema-validation predicate every mutation runs before touching a
/// page: column count must match, types must match positionally, a null
/// value violates `not_null`, and an over-length VARCHAR is rejected.
pub fn exact_match(columns: &[Column], record: &Record) -> Result<()> {
    if columns.len() != record.values.len() {
        return Err(DbError::SchemaMismatch(format!(
            "expected {} columns, got {}",
            columns.len(),
            record.values.len()
        )));
    }
    for (column, (col_id, value)) in columns.iter().zip(record.values.iter()) {
        if column.id != *col_id {
            return Err(DbError::SchemaMismatch(format!(
                "column id mismatch: expected {}, got {col_id}",
                column.id
            )));
        }
        if !value.is_null() {
            let types_match = matches!(
                (&column.ty, value),
                (ColumnType::Int, DataValue::Int { .. })
                    | (ColumnType::Float, DataValue::Float { .. })
                    | (ColumnType::Varchar(_), DataValue::Varchar { .. })
                    | (ColumnType::Date, DataValue::Date { .. })
            );
            if !types_match {
                return Err(DbError::SchemaMismatch(format!(
                    "type mismatch on column {}",
                    column.id
                )));
            }
        }
        if value.is_null() && column.not_null {
            return Err(DbError::NotNullViolation(column.id));
        }
        if let (ColumnType::Varchar(max_len), DataValue::Varchar { value: s, is_null: false }) =
            (&column.ty, value)
        {
            if s.len() > *max_len as usize {
                return Err(DbError::Validation(format!(
                    "varchar value exceeds declared length {max_len} on column {}",
                    column.id
                )));
            }
        }
    }
    Ok(())
}
