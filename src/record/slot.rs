//! Slot encode/decode: packs a [`Record`] into the fixed-width byte layout
//! described by §4.4 — `{data_id:u32, null_bitmap, column payloads in
//! declared order}` — and back.

use crate::common::bitops;
use crate::error::{DbError, Result};
use crate::record::schema::{null_bitmap_words, slot_len};
use crate::record::types::{Column, ColumnType, DataValue, DateValue, Record};

fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn words_to_bytes(words: &[u32], out: &mut [u8]) {
    for (i, w) in words.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
    }
}

fn write_bytes_into_words(region: &mut [u32], bytes: &[u8]) {
    let n = bytes.len().min(region.len() * 4);
    for (i, &b) in bytes[..n].iter().enumerate() {
        bitops::set_byte(region, i, b);
    }
}

fn read_bytes_from_words(region: &[u32], len: usize) -> Vec<u8> {
    let n = len.min(region.len() * 4);
    (0..n).map(|i| bitops::get_byte(region, i)).collect()
}

/// Encode `record`'s values (already validated against `columns` by
/// [`crate::record::types::exact_match`]) into a fixed-width slot.
pub fn encode_record(columns: &[Column], record: &Record) -> Vec<u8> {
    let len = slot_len(columns);
    let mut words = vec![0u32; len / 4];
    let nb_words = null_bitmap_words(columns.len());

    words[0] = record.data_id;

    let mut word_offset = 1 + nb_words;
    for (i, column) in columns.iter().enumerate() {
        let value = record.get(column.id);
        let is_null = value.map(DataValue::is_null).unwrap_or(true);
        bitops::set_bit(&mut words[1..1 + nb_words], i, is_null);

        let payload_words = column.ty.payload_width() / 4;
        let region = &mut words[word_offset..word_offset + payload_words];
        if let Some(value) = value {
            write_payload(region, column.ty, value);
        }
        word_offset += payload_words;
    }

    let mut out = vec![0u8; len];
    words_to_bytes(&words, &mut out);
    out
}

fn write_payload(region: &mut [u32], ty: ColumnType, value: &DataValue) {
    if value.is_null() {
        return;
    }
    match (ty, value) {
        (ColumnType::Int, DataValue::Int { value, .. }) => region[0] = bitops::int_to_bit32(*value),
        (ColumnType::Date, DataValue::Date { value, .. }) => {
            let packed = (value.year as i32) << 16 | (value.month as i32) << 8 | value.day as i32;
            region[0] = bitops::int_to_bit32(packed);
        }
        (ColumnType::Float, DataValue::Float { value, .. }) => {
            let words = bitops::float_to_bit32(*value);
            region[0] = words[0];
            region[1] = words[1];
        }
        (ColumnType::Varchar(_), DataValue::Varchar { value, .. }) => {
            bitops::set_two_bytes(region, 1, value.len() as u16);
            write_bytes_into_words(&mut region[1..], value.as_bytes());
        }
        _ => {}
    }
}

/// Decode a slot previously written by [`encode_record`] back into a
/// [`Record`], given the schema it was encoded against.
pub fn decode_record(columns: &[Column], slot: &[u8]) -> Result<Record> {
    if slot.len() != slot_len(columns) {
        return Err(DbError::SchemaMismatch(format!(
            "slot length {} does not match schema's expected {}",
            slot.len(),
            slot_len(columns)
        )));
    }
    let words = bytes_to_words(slot);
    let nb_words = null_bitmap_words(columns.len());
    let data_id = words[0];

    let mut values = Vec::with_capacity(columns.len());
    let mut word_offset = 1 + nb_words;
    for (i, column) in columns.iter().enumerate() {
        let is_null = bitops::get_bit(&words[1..1 + nb_words], i);
        let payload_words = column.ty.payload_width() / 4;
        let region = &words[word_offset..word_offset + payload_words];
        values.push((column.id, read_payload(region, column.ty, is_null)));
        word_offset += payload_words;
    }
    Ok(Record::new(data_id, values))
}

fn read_payload(region: &[u32], ty: ColumnType, is_null: bool) -> DataValue {
    match ty {
        ColumnType::Int => DataValue::Int { value: bitops::bit32_to_int(region[0]), is_null },
        ColumnType::Date => {
            let packed = bitops::bit32_to_int(region[0]);
            DataValue::Date {
                value: DateValue {
                    year: ((packed >> 16) & 0xFFFF) as u16,
                    month: ((packed >> 8) & 0xFF) as u8,
                    day: (packed & 0xFF) as u8,
                },
                is_null,
            }
        }
        ColumnType::Float => {
            DataValue::Float { value: bitops::bit32_to_float([region[0], region[1]]), is_null }
        }
        ColumnType::Varchar(_) => {
            let len = bitops::get_two_bytes(region, 1) as usize;
            let bytes = read_bytes_from_words(&region[1..], len);
            DataValue::Varchar { value: String::from_utf8_lossy(&bytes).into_owned(), is_null }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        vec![
            Column { id: 0, name: "id".into(), ty: ColumnType::Int, not_null: true, unique: false, default: None },
            Column { id: 1, name: "s".into(), ty: ColumnType::Varchar(8), not_null: false, unique: false, default: None },
            Column { id: 2, name: "f".into(), ty: ColumnType::Float, not_null: false, unique: false, default: None },
        ]
    }

    #[test]
    fn encode_decode_roundtrip() {
        let cols = columns();
        let record = Record::new(
            7,
            vec![
                (0, DataValue::Int { value: 42, is_null: false }),
                (1, DataValue::Varchar { value: "hi".into(), is_null: false }),
                (2, DataValue::Float { value: 3.5, is_null: false }),
            ],
        );
        let slot = encode_record(&cols, &record);
        let decoded = decode_record(&cols, &slot).unwrap();
        assert_eq!(decoded.data_id, 7);
        assert_eq!(decoded, record);
    }

    #[test]
    fn null_values_roundtrip() {
        let cols = columns();
        let record = Record::new(
            1,
            vec![
                (0, DataValue::Int { value: 1, is_null: false }),
                (1, DataValue::null_varchar()),
                (2, DataValue::null_float()),
            ],
        );
        let slot = encode_record(&cols, &record);
        let decoded = decode_record(&cols, &slot).unwrap();
        assert!(decoded.get(1).unwrap().is_null());
        assert!(decoded.get(2).unwrap().is_null());
    }
}
