//! RecordManager — slotted heap file manager (§4.4), grounded on
//! `original_source/record/RecordManager`.
//!
//! Page 0 of every managed file is the schema header ([`schema`]); pages
//! 1.. are heap pages ([`heap`]) of fixed-width slots ([`slot`]). The
//! manager shares one [`BufferPoolManager`] with the index manager and
//! catalog via `Rc<RefCell<..>>` — the idiomatic single-threaded
//! shared-mutable-state pattern, since there is no real concurrency to
//! guard against (§5).

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use log::debug;

use crate::buffer::BufferPoolManager;
use crate::common::{FileHandle, OpenFileCache, PageId};
use crate::error::{DbError, Result};
use crate::record::heap;
use crate::record::schema::{self, SchemaHeader};
use crate::record::slot;
use crate::record::types::{exact_match, Column, DataValue, Record, RecordLocation};

pub struct RecordManager {
    bpm: Rc<RefCell<BufferPoolManager>>,
    files: OpenFileCache,
    schema_cache: std::collections::HashMap<FileHandle, (SchemaHeader, Vec<Column>)>,
}

impl RecordManager {
    pub fn new(bpm: Rc<RefCell<BufferPoolManager>>) -> Self {
        Self { bpm, files: OpenFileCache::new(), schema_cache: std::collections::HashMap::new() }
    }

    /// Create a new, empty record file with the given schema.
    pub fn initialize(&mut self, path: &Path, columns: &[Column]) -> Result<()> {
        let bpm_rc = self.bpm.clone();
        bpm_rc.borrow_mut().create_file(path)?;
        let handle = self.files.get_or_open(&mut bpm_rc.borrow_mut(), path, false)?;

        let header = SchemaHeader {
            next_column_id: columns.len() as i32,
            live_page_count: 0,
            next_data_id: 0,
            null_bitmap_words: schema::null_bitmap_words(columns.len()) as u32,
        };
        self.write_page0(handle, &header, columns)?;
        self.schema_cache.insert(handle, (header, columns.to_vec()));
        Ok(())
    }

    fn write_page0(&mut self, handle: FileHandle, header: &SchemaHeader, columns: &[Column]) -> Result<()> {
        let mut bpm = self.bpm.borrow_mut();
        let idx = bpm.get_page(handle, PageId::new(0))?;
        schema::write_schema(bpm.frame_data_mut(idx), header, columns)?;
        bpm.mark_dirty(idx);
        Ok(())
    }

    fn handle(&mut self, path: &Path) -> Result<FileHandle> {
        let bpm = self.bpm.clone();
        self.files.get_or_open(&mut bpm.borrow_mut(), path, false)
    }

    fn schema(&mut self, path: &Path) -> Result<(FileHandle, SchemaHeader, Vec<Column>)> {
        let handle = self.handle(path)?;
        if let Some((header, columns)) = self.schema_cache.get(&handle) {
            return Ok((handle, *header, columns.clone()));
        }
        let mut bpm = self.bpm.borrow_mut();
        let idx = bpm.get_page(handle, PageId::new(0))?;
        let (header, columns) = schema::read_schema(bpm.frame_data(idx))?;
        drop(bpm);
        self.schema_cache.insert(handle, (header, columns.clone()));
        Ok((handle, header, columns))
    }

    pub fn get_column_types(&mut self, path: &Path) -> Result<Vec<Column>> {
        Ok(self.schema(path)?.2)
    }

    /// Flip a column's `unique` flag in the schema header, persisting it.
    pub fn update_column_unique(&mut self, path: &Path, column_id: i32, unique: bool) -> Result<()> {
        let (handle, header, mut columns) = self.schema(path)?;
        let column = columns
            .iter_mut()
            .find(|c| c.id == column_id)
            .ok_or(DbError::ColumnNotFound(column_id.to_string()))?;
        column.unique = unique;
        self.write_page0(handle, &header, &columns)?;
        self.schema_cache.insert(handle, (header, columns));
        Ok(())
    }

    /// Flip a column's `not_null` flag in the schema header, persisting it.
    /// Mirrors [`Self::update_column_unique`]; used by `add_primary_key` to
    /// force NOT NULL onto freshly-declared primary-key columns.
    pub fn update_column_not_null(&mut self, path: &Path, column_id: i32, not_null: bool) -> Result<()> {
        let (handle, header, mut columns) = self.schema(path)?;
        let column = columns
            .iter_mut()
            .find(|c| c.id == column_id)
            .ok_or(DbError::ColumnNotFound(column_id.to_string()))?;
        column.not_null = not_null;
        self.write_page0(handle, &header, &columns)?;
        self.schema_cache.insert(handle, (header, columns));
        Ok(())
    }

    fn set_header(&mut self, handle: FileHandle, header: SchemaHeader) -> Result<()> {
        let columns = self.schema_cache.get(&handle).map(|(_, c)| c.clone()).unwrap_or_default();
        self.write_page0(handle, &header, &columns)?;
        self.schema_cache.insert(handle, (header, columns));
        Ok(())
    }

    /// Insert a record, scanning existing heap pages' occupancy bitmaps for
    /// the first free slot before appending a new page. Validates with
    /// `exact_match` before touching any page.
    pub fn insert_record(&mut self, path: &Path, values: Vec<(i32, DataValue)>) -> Result<RecordLocation> {
        let (handle, mut header, columns) = self.schema(path)?;
        let record = Record::new(header.next_data_id, values);
        exact_match(&columns, &record)?;

        let capacity = heap::slot_capacity(&columns);
        let slot_len = schema::slot_len(&columns);
        let encoded = slot::encode_record(&columns, &record);

        let mut bpm = self.bpm.borrow_mut();
        for page_no in 1..=header.live_page_count {
            let idx = bpm.get_page(handle, PageId::new(page_no as i32))?;
            if let Some(slot_id) = heap::find_first_free(bpm.frame_data(idx), capacity) {
                heap::set_occupied(bpm.frame_data_mut(idx), slot_id, true);
                heap::slot_bytes_mut(bpm.frame_data_mut(idx), slot_id, slot_len).copy_from_slice(&encoded);
                bpm.mark_dirty(idx);
                drop(bpm);
                header.next_data_id += 1;
                self.set_header(handle, header)?;
                return Ok(RecordLocation { page_id: page_no, slot_id: slot_id as u32 });
            }
        }

        // No free slot on any existing page: append a new one.
        let new_page_no = header.live_page_count + 1;
        let idx = bpm.get_page(handle, PageId::new(new_page_no as i32))?;
        bpm.frame_data_mut(idx).fill(0);
        heap::set_occupied(bpm.frame_data_mut(idx), 0, true);
        heap::slot_bytes_mut(bpm.frame_data_mut(idx), 0, slot_len).copy_from_slice(&encoded);
        bpm.mark_dirty(idx);
        drop(bpm);

        header.live_page_count = new_page_no;
        header.next_data_id += 1;
        self.set_header(handle, header)?;
        debug!("inserted into new page {new_page_no} of {path:?}");
        Ok(RecordLocation { page_id: new_page_no, slot_id: 0 })
    }

    pub fn delete_record(&mut self, path: &Path, loc: RecordLocation) -> Result<()> {
        let handle = self.handle(path)?;
        let mut bpm = self.bpm.borrow_mut();
        let idx = bpm.get_page(handle, PageId::new(loc.page_id as i32))?;
        if !heap::is_occupied(bpm.frame_data(idx), loc.slot_id as usize) {
            return Err(DbError::RecordNotFound(loc));
        }
        heap::set_occupied(bpm.frame_data_mut(idx), loc.slot_id as usize, false);
        bpm.mark_dirty(idx);
        Ok(())
    }

    pub fn get_record(&mut self, path: &Path, loc: RecordLocation) -> Result<Record> {
        let (handle, _header, columns) = self.schema(path)?;
        let slot_len = schema::slot_len(&columns);
        let mut bpm = self.bpm.borrow_mut();
        let idx = bpm.get_page(handle, PageId::new(loc.page_id as i32))?;
        if !heap::is_occupied(bpm.frame_data(idx), loc.slot_id as usize) {
            return Err(DbError::RecordNotFound(loc));
        }
        let bytes = heap::slot_bytes(bpm.frame_data(idx), loc.slot_id as usize, slot_len);
        slot::decode_record(&columns, bytes)
    }

    pub fn get_records(&mut self, path: &Path, locs: &[RecordLocation]) -> Result<Vec<Record>> {
        locs.iter().map(|&loc| self.get_record(path, loc)).collect()
    }

    /// Patch only the given column ids onto a copy of the current record,
    /// re-validate, and only commit to the page if validation passes — the
    /// original slot bytes are never touched on failure.
    pub fn update_record(
        &mut self,
        path: &Path,
        loc: RecordLocation,
        patch: Vec<(i32, DataValue)>,
    ) -> Result<Record> {
        let (handle, _header, columns) = self.schema(path)?;
        let slot_len = schema::slot_len(&columns);

        let mut bpm = self.bpm.borrow_mut();
        let idx = bpm.get_page(handle, PageId::new(loc.page_id as i32))?;
        if !heap::is_occupied(bpm.frame_data(idx), loc.slot_id as usize) {
            return Err(DbError::RecordNotFound(loc));
        }
        let current_bytes = heap::slot_bytes(bpm.frame_data(idx), loc.slot_id as usize, slot_len);
        let mut current = slot::decode_record(&columns, current_bytes)?;

        for (col_id, value) in patch {
            if let Some(slot) = current.values.iter_mut().find(|(id, _)| *id == col_id) {
                slot.1 = value;
            }
        }
        exact_match(&columns, &current)?;

        let encoded = slot::encode_record(&columns, &current);
        heap::slot_bytes_mut(bpm.frame_data_mut(idx), loc.slot_id as usize, slot_len).copy_from_slice(&encoded);
        bpm.mark_dirty(idx);
        Ok(current)
    }

    pub fn get_all_records(&mut self, path: &Path) -> Result<Vec<(RecordLocation, Record)>> {
        self.get_all_with_constraint(path, |_| true)
    }

    pub fn get_records_in_page_range(
        &mut self,
        path: &Path,
        start_page: u32,
        end_page: u32,
    ) -> Result<Vec<(RecordLocation, Record)>> {
        let (handle, _header, columns) = self.schema(path)?;
        let slot_len = schema::slot_len(&columns);
        let capacity = heap::slot_capacity(&columns);
        let mut out = Vec::new();
        let mut bpm = self.bpm.borrow_mut();
        for page_no in start_page..=end_page {
            let idx = bpm.get_page(handle, PageId::new(page_no as i32))?;
            for slot_id in 0..capacity {
                if heap::is_occupied(bpm.frame_data(idx), slot_id) {
                    let bytes = heap::slot_bytes(bpm.frame_data(idx), slot_id, slot_len);
                    let record = slot::decode_record(&columns, bytes)?;
                    out.push((RecordLocation { page_id: page_no, slot_id: slot_id as u32 }, record));
                }
            }
        }
        Ok(out)
    }

    /// Scan the whole heap, evaluating `pred` inline per slot rather than
    /// collecting the full table first (§4.4 supplement), keeping memory
    /// bounded by one page at a time.
    pub fn get_all_with_constraint(
        &mut self,
        path: &Path,
        pred: impl Fn(&Record) -> bool,
    ) -> Result<Vec<(RecordLocation, Record)>> {
        let (handle, header, columns) = self.schema(path)?;
        let slot_len = schema::slot_len(&columns);
        let capacity = heap::slot_capacity(&columns);
        let mut out = Vec::new();
        let mut bpm = self.bpm.borrow_mut();
        for page_no in 1..=header.live_page_count {
            let idx = bpm.get_page(handle, PageId::new(page_no as i32))?;
            for slot_id in 0..capacity {
                if heap::is_occupied(bpm.frame_data(idx), slot_id) {
                    let bytes = heap::slot_bytes(bpm.frame_data(idx), slot_id, slot_len);
                    let record = slot::decode_record(&columns, bytes)?;
                    if pred(&record) {
                        out.push((RecordLocation { page_id: page_no, slot_id: slot_id as u32 }, record));
                    }
                }
            }
        }
        Ok(out)
    }

    /// As [`Self::get_all_with_constraint`], but streams matching rows to a
    /// CSV file (comma-separated, column-id order) instead of collecting
    /// them, for `search_and_save`/bulk export. Returns the row count.
    pub fn get_all_with_constraint_save_file(
        &mut self,
        path: &Path,
        pred: impl Fn(&Record) -> bool,
        dest: &Path,
    ) -> Result<usize> {
        use std::io::Write;
        let rows = self.get_all_with_constraint(path, pred)?;
        let mut file = std::fs::File::create(dest).map_err(DbError::Io)?;
        for (_, record) in &rows {
            let mut values: Vec<(i32, &DataValue)> =
                record.values.iter().map(|(id, v)| (*id, v)).collect();
            values.sort_by_key(|(id, _)| *id);
            let line = values.iter().map(|(_, v)| v.to_string()).collect::<Vec<_>>().join(",");
            writeln!(file, "{line}").map_err(DbError::Io)?;
        }
        Ok(rows.len())
    }

    /// Close and forget a cached handle for `path` without deleting the
    /// file, flushing any dirty pages first. Used when a whole database or
    /// table is being dropped and its files are about to be removed out
    /// from under the cache by a recursive folder delete.
    pub fn close_file(&mut self, path: &Path) -> Result<()> {
        let bpm_rc = self.bpm.clone();
        let mut bpm = bpm_rc.borrow_mut();
        if let Some(handle) = self.files.forget_and_return(&mut bpm, path)? {
            self.schema_cache.remove(&handle);
        }
        Ok(())
    }

    /// Delete the record file entirely: forget the cached handle and remove
    /// it from disk. Stale `schema_cache` entries for the old handle are
    /// harmless garbage (handles are never reused, so they can never be
    /// looked up again) and are left for the allocator to reclaim.
    pub fn delete_record_file(&mut self, path: &Path) -> Result<()> {
        let bpm_rc = self.bpm.clone();
        let mut bpm = bpm_rc.borrow_mut();
        self.files.forget(&mut bpm, path)?;
        if bpm.exists(path) {
            let handle = bpm.open_file(path)?;
            bpm.delete_file(handle, path)?;
        }
        Ok(())
    }

    /// Bulk CSV load into a file known to be completely empty: fills pages
    /// strictly sequentially, never probing the occupancy bitmap, and
    /// updates counters once at the end. Returns the page's slot capacity
    /// so callers can compute `(data_id → location)` arithmetically.
    ///
    /// Precondition (not defensively checked, matching the source): `path`
    /// must have zero live rows.
    pub fn insert_records_to_empty(
        &mut self,
        path: &Path,
        rows: Vec<Vec<(i32, DataValue)>>,
    ) -> Result<usize> {
        let (handle, mut header, columns) = self.schema(path)?;
        let capacity = heap::slot_capacity(&columns);
        let slot_len = schema::slot_len(&columns);

        let row_count = rows.len() as u32;
        let mut bpm = self.bpm.borrow_mut();
        let mut page_no = 0u32;
        let mut slot_in_page = capacity; // force a fresh page on the first row
        for (i, values) in rows.into_iter().enumerate() {
            if slot_in_page == capacity {
                page_no += 1;
                slot_in_page = 0;
                let idx = bpm.get_page(handle, PageId::new(page_no as i32))?;
                bpm.frame_data_mut(idx).fill(0);
                bpm.mark_dirty(idx);
            }
            let record = Record::new(header.next_data_id + i as u32, values);
            exact_match(&columns, &record)?;
            let encoded = slot::encode_record(&columns, &record);

            let idx = bpm.get_page(handle, PageId::new(page_no as i32))?;
            heap::set_occupied(bpm.frame_data_mut(idx), slot_in_page, true);
            heap::slot_bytes_mut(bpm.frame_data_mut(idx), slot_in_page, slot_len).copy_from_slice(&encoded);
            bpm.mark_dirty(idx);
            slot_in_page += 1;
        }
        drop(bpm);

        header.live_page_count = page_no;
        header.next_data_id += row_count;
        self.set_header(handle, header)?;
        Ok(capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::types::{ColumnType, DataValue};
    use tempfile::tempdir;

    fn columns() -> Vec<Column> {
        vec![
            Column { id: 0, name: "id".into(), ty: ColumnType::Int, not_null: true, unique: false, default: None },
            Column { id: 1, name: "s".into(), ty: ColumnType::Varchar(8), not_null: false, unique: false, default: None },
        ]
    }

    fn setup() -> (RecordManager, std::path::PathBuf, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Record");
        let bpm = Rc::new(RefCell::new(BufferPoolManager::with_capacity(32)));
        let mut rm = RecordManager::new(bpm);
        rm.initialize(&path, &columns()).unwrap();
        (rm, path, dir)
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let (mut rm, path, _dir) = setup();
        let loc = rm
            .insert_record(&path, vec![(0, DataValue::Int { value: 1, is_null: false }), (1, DataValue::Varchar { value: "a".into(), is_null: false })])
            .unwrap();
        let record = rm.get_record(&path, loc).unwrap();
        assert_eq!(record.get(0).unwrap().to_string(), "1");
    }

    #[test]
    fn delete_then_reinsert_reuses_slot() {
        let (mut rm, path, _dir) = setup();
        let loc1 = rm
            .insert_record(&path, vec![(0, DataValue::Int { value: 1, is_null: false }), (1, DataValue::null_varchar())])
            .unwrap();
        rm.delete_record(&path, loc1).unwrap();
        let loc2 = rm
            .insert_record(&path, vec![(0, DataValue::Int { value: 2, is_null: false }), (1, DataValue::null_varchar())])
            .unwrap();
        assert_eq!(loc1.page_id, loc2.page_id);
        assert_eq!(loc1.slot_id, loc2.slot_id);
    }

    #[test]
    fn update_rejects_not_null_violation_without_mutating() {
        let (mut rm, path, _dir) = setup();
        let loc = rm
            .insert_record(&path, vec![(0, DataValue::Int { value: 1, is_null: false }), (1, DataValue::null_varchar())])
            .unwrap();
        let err = rm.update_record(&path, loc, vec![(0, DataValue::null_int())]);
        assert!(err.is_err());
        let still = rm.get_record(&path, loc).unwrap();
        assert_eq!(still.get(0).unwrap().to_string(), "1");
    }

    #[test]
    fn bulk_load_fills_pages_sequentially() {
        let (mut rm, path, _dir) = setup();
        let rows: Vec<_> = (0..5)
            .map(|i| vec![(0, DataValue::Int { value: i, is_null: false }), (1, DataValue::null_varchar())])
            .collect();
        rm.insert_records_to_empty(&path, rows).unwrap();
        let all = rm.get_all_records(&path).unwrap();
        assert_eq!(all.len(), 5);
    }
}
