//! Constraint-merge and index-selection planning for `search` (§4.6.1).
//!
//! Grounded on `original_source/system/SystemManager.cpp`'s
//! `selectRecordsByCondition`: predicates on one column are folded into a
//! single closed-or-half-open interval plus a leftover `!=` list, then
//! matched against each declared index's column order to find the longest
//! usable prefix. Everything that survives the chosen index's range scan
//! is re-checked against the full interval set as a residual filter, since
//! an index only narrows on its own columns.

use std::cmp::Ordering;

use crate::common::config::{FLOAT_MAX, INT_MAX, INT_MIN};
use crate::record::{ColumnType, DataValue, DateValue, Record};

use super::types::{CompareOp, SearchConstraint};

/// A column's folded bound: `low`/`high` are `None` when unbounded on that
/// side. `neq` holds leftover `!=` values that fall inside `[low, high]`
/// (ones outside it can never match and are dropped during the fold).
#[derive(Debug, Clone)]
pub struct ColumnInterval {
    pub column_id: i32,
    pub data_type: ColumnType,
    pub low: Option<DataValue>,
    pub low_inclusive: bool,
    pub high: Option<DataValue>,
    pub high_inclusive: bool,
    pub neq: Vec<DataValue>,
}

impl ColumnInterval {
    fn unbounded(column_id: i32, data_type: ColumnType) -> Self {
        Self {
            column_id,
            data_type,
            low: None,
            low_inclusive: true,
            high: None,
            high_inclusive: true,
            neq: Vec::new(),
        }
    }

    fn tighten_low(&mut self, value: DataValue, inclusive: bool) {
        let replace = match &self.low {
            None => true,
            Some(existing) => match value.partial_cmp(existing) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => !inclusive && self.low_inclusive,
                _ => false,
            },
        };
        if replace {
            self.low_inclusive = inclusive;
            self.low = Some(value);
        }
    }

    fn tighten_high(&mut self, value: DataValue, inclusive: bool) {
        let replace = match &self.high {
            None => true,
            Some(existing) => match value.partial_cmp(existing) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => !inclusive && self.high_inclusive,
                _ => false,
            },
        };
        if replace {
            self.high_inclusive = inclusive;
            self.high = Some(value);
        }
    }

    /// Whether the interval pins the column to a single value, i.e. an
    /// index on this column can be probed with an exact key rather than
    /// a range.
    pub fn is_exact(&self) -> bool {
        matches!((&self.low, &self.high), (Some(a), Some(b)) if a == b)
            && self.low_inclusive
            && self.high_inclusive
    }

    pub fn is_bounded(&self) -> bool {
        self.low.is_some() || self.high.is_some()
    }

    fn matches(&self, value: &DataValue) -> bool {
        if let Some(low) = &self.low {
            match value.partial_cmp(low) {
                Some(Ordering::Less) => return false,
                Some(Ordering::Equal) if !self.low_inclusive => return false,
                None => return false,
                _ => {}
            }
        }
        if let Some(high) = &self.high {
            match value.partial_cmp(high) {
                Some(Ordering::Greater) => return false,
                Some(Ordering::Equal) if !self.high_inclusive => return false,
                None => return false,
                _ => {}
            }
        }
        !self.neq.iter().any(|n| n == value)
    }
}

/// Group constraints by column id and fold each group into one interval
/// (§4.6.1 step 1-2).
pub fn merge_constraints(constraints: &[SearchConstraint]) -> Vec<ColumnInterval> {
    let mut intervals: Vec<ColumnInterval> = Vec::new();
    for c in constraints {
        let interval = match intervals.iter_mut().find(|i| i.column_id == c.column_id) {
            Some(i) => i,
            None => {
                intervals.push(ColumnInterval::unbounded(c.column_id, c.data_type));
                intervals.last_mut().unwrap()
            }
        };
        for (op, value) in &c.predicates {
            match op {
                CompareOp::Eq => {
                    interval.tighten_low(value.clone(), true);
                    interval.tighten_high(value.clone(), true);
                }
                CompareOp::Neq => interval.neq.push(value.clone()),
                CompareOp::Gt => interval.tighten_low(value.clone(), false),
                CompareOp::Geq => interval.tighten_low(value.clone(), true),
                CompareOp::Lt => interval.tighten_high(value.clone(), false),
                CompareOp::Leq => interval.tighten_high(value.clone(), true),
            }
        }
    }
    for interval in &mut intervals {
        interval.neq.retain(|v| {
            let in_range = match (&interval.low, &interval.high) {
                (Some(low), Some(high)) => v >= low && v <= high,
                (Some(low), None) => v >= low,
                (None, Some(high)) => v <= high,
                (None, None) => true,
            };
            in_range
        });
    }
    intervals
}

/// Does `record` satisfy every interval? Used both as the fallback full
/// scan and as the residual filter after an index-assisted range scan.
pub fn record_matches(record: &Record, intervals: &[ColumnInterval]) -> bool {
    intervals.iter().all(|interval| match record.get(interval.column_id) {
        Some(value) => interval.matches(value),
        None => false,
    })
}

/// Columns eligible for index key encoding. VARCHAR is excluded: its
/// range bounds are only usable as a residual filter, never as a B+ tree
/// key (§4.5 keys are fixed-width integer words).
fn indexable(ty: ColumnType) -> bool {
    !matches!(ty, ColumnType::Varchar(_))
}

/// Longest usable prefix of `index_columns` against the folded intervals:
/// the run of leading columns that are bounded, stopping at the first
/// column with no interval, an unbounded interval, or a non-indexable
/// type (§4.6.1 "index prefix selection" supplement).
pub fn usable_prefix(index_columns: &[i32], intervals: &[ColumnInterval]) -> usize {
    let mut prefix = 0;
    for &col in index_columns {
        match intervals.iter().find(|i| i.column_id == col) {
            Some(interval) if interval.is_bounded() && indexable(interval.data_type) => {
                prefix += 1;
                if !interval.is_exact() {
                    // A range (non-equality) bound can extend the prefix by
                    // one column, but no further column can be folded into
                    // the same scan once the key stops being an exact match.
                    break;
                }
            }
            _ => break,
        }
    }
    prefix
}

/// Pick the declared index with the longest usable prefix. Ties are
/// broken by declaration order (the first index in `indexes` wins).
pub fn select_index<'a>(
    indexes: &'a [super::types::IndexEntry],
    intervals: &[ColumnInterval],
) -> Option<(&'a super::types::IndexEntry, usize)> {
    let mut best: Option<(&super::types::IndexEntry, usize)> = None;
    for index in indexes {
        let prefix = usable_prefix(&index.columns, intervals);
        if prefix == 0 {
            continue;
        }
        match &best {
            Some((_, best_prefix)) if *best_prefix >= prefix => {}
            _ => best = Some((index, prefix)),
        }
    }
    best
}

fn sentinel_low(ty: ColumnType) -> DataValue {
    match ty {
        ColumnType::Int => DataValue::Int { value: INT_MIN, is_null: false },
        ColumnType::Float => DataValue::Float { value: -FLOAT_MAX, is_null: false },
        ColumnType::Varchar(_) => DataValue::Varchar { value: String::new(), is_null: false },
        ColumnType::Date => DataValue::Date { value: DateValue { year: 0, month: 0, day: 0 }, is_null: false },
    }
}

fn sentinel_high(ty: ColumnType) -> DataValue {
    match ty {
        ColumnType::Int => DataValue::Int { value: INT_MAX, is_null: false },
        ColumnType::Float => DataValue::Float { value: FLOAT_MAX, is_null: false },
        ColumnType::Varchar(_) => {
            DataValue::Varchar { value: "\u{10FFFF}".repeat(64), is_null: false }
        }
        ColumnType::Date => {
            DataValue::Date { value: DateValue { year: 9999, month: 99, day: 99 }, is_null: false }
        }
    }
}

/// Encode a column value for storage in a B+ tree key, mapping a null to
/// the type's low sentinel so it still sorts before every non-null value
/// (§4.4 supplement's null-ordering, carried into index keys).
pub fn encode_for_index(value: &DataValue) -> Vec<i32> {
    if value.is_null() {
        encode_key_component(&sentinel_low(value.column_type()))
    } else {
        encode_key_component(value)
    }
}

/// Words a column of this type contributes to an index key: one for
/// INT/DATE, two for FLOAT (via bit-reinterpretation). VARCHAR columns are
/// not indexable.
pub fn key_word_width(ty: ColumnType) -> usize {
    match ty {
        ColumnType::Int | ColumnType::Date => 1,
        ColumnType::Float => 2,
        ColumnType::Varchar(_) => 0,
    }
}

/// Encode one resolved value into the `i32` words a B+ tree key stores it
/// as (§4.5): one word for INT/DATE, two for FLOAT via bit-reinterpretation.
pub fn encode_key_component(value: &DataValue) -> Vec<i32> {
    use crate::common::bitops::{float_to_bit32, int_to_bit32};
    match value {
        DataValue::Int { value, .. } => vec![int_to_bit32(*value) as i32],
        DataValue::Float { value, .. } => {
            let words = float_to_bit32(*value);
            vec![words[0] as i32, words[1] as i32]
        }
        DataValue::Date { value, .. } => {
            vec![value.year as i32 * 10000 + value.month as i32 * 100 + value.day as i32]
        }
        DataValue::Varchar { .. } => {
            unreachable!("varchar columns are excluded from index key encoding")
        }
    }
}

/// Build the `(low, high)` key tuples for a range scan over the chosen
/// index's first `prefix` columns.
pub fn build_range_keys(
    index_columns: &[i32],
    prefix: usize,
    intervals: &[ColumnInterval],
) -> (Vec<i32>, Vec<i32>) {
    let mut low = Vec::new();
    let mut high = Vec::new();
    for &col in &index_columns[..prefix] {
        let interval = intervals.iter().find(|i| i.column_id == col).expect("prefix is bounded");
        let low_value = interval.low.clone().unwrap_or_else(|| sentinel_low(interval.data_type));
        let high_value = interval.high.clone().unwrap_or_else(|| sentinel_high(interval.data_type));
        low.extend(encode_key_component(&low_value));
        high.extend(encode_key_component(&high_value));
    }
    (low, high)
}

/// Stable nulls-first sort over the given column order (§4.6.1 step 4),
/// relying on `DataValue`'s null-before-non-null `PartialOrd`.
pub fn sort_records(records: &mut [Record], order_by: &[i32]) {
    records.sort_by(|a, b| {
        for &col in order_by {
            let av = a.get(col);
            let bv = b.get(col);
            let ord = match (av, bv) {
                (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::IndexEntry;

    fn eq(col: i32, ty: ColumnType, v: i32) -> SearchConstraint {
        SearchConstraint::new(col, ty).with(CompareOp::Eq, DataValue::Int { value: v, is_null: false })
    }

    #[test]
    fn merge_folds_eq_into_exact_interval() {
        let intervals = merge_constraints(&[eq(0, ColumnType::Int, 5)]);
        assert_eq!(intervals.len(), 1);
        assert!(intervals[0].is_exact());
    }

    #[test]
    fn merge_drops_neq_outside_final_range() {
        let c = SearchConstraint::new(0, ColumnType::Int)
            .with(CompareOp::Geq, DataValue::Int { value: 0, is_null: false })
            .with(CompareOp::Leq, DataValue::Int { value: 10, is_null: false })
            .with(CompareOp::Neq, DataValue::Int { value: 20, is_null: false })
            .with(CompareOp::Neq, DataValue::Int { value: 5, is_null: false });
        let intervals = merge_constraints(&[c]);
        assert_eq!(intervals[0].neq.len(), 1);
        assert_eq!(intervals[0].neq[0], DataValue::Int { value: 5, is_null: false });
    }

    #[test]
    fn usable_prefix_stops_at_first_unbounded_column() {
        let intervals = merge_constraints(&[eq(0, ColumnType::Int, 1)]);
        assert_eq!(usable_prefix(&[0, 1, 2], &intervals), 1);
    }

    #[test]
    fn usable_prefix_extends_one_column_past_a_range_bound() {
        let c0 = eq(0, ColumnType::Int, 1);
        let c1 = SearchConstraint::new(1, ColumnType::Int)
            .with(CompareOp::Gt, DataValue::Int { value: 3, is_null: false });
        let intervals = merge_constraints(&[c0, c1]);
        assert_eq!(usable_prefix(&[0, 1, 2], &intervals), 2);
    }

    #[test]
    fn select_index_breaks_ties_by_declaration_order() {
        let intervals = merge_constraints(&[eq(0, ColumnType::Int, 1)]);
        let indexes = vec![
            IndexEntry { id: 0, columns: vec![0], name: Some("first".into()) },
            IndexEntry { id: 1, columns: vec![0], name: Some("second".into()) },
        ];
        let (chosen, prefix) = select_index(&indexes, &intervals).unwrap();
        assert_eq!(chosen.name.as_deref(), Some("first"));
        assert_eq!(prefix, 1);
    }

    #[test]
    fn sort_records_places_nulls_first() {
        let mut records = vec![
            Record::new(0, vec![(0, DataValue::Int { value: 5, is_null: false })]),
            Record::new(1, vec![(0, DataValue::null_int())]),
        ];
        sort_records(&mut records, &[0]);
        assert!(records[0].get(0).unwrap().is_null());
    }
}
