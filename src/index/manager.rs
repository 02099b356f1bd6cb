//! `IndexManager` — a B+ tree keyed on a fixed-length integer tuple,
//! mapping keys to heap record locators (§4.5). Grounded on
//! `original_source/index/IndexManager.{hpp,cpp}`: the split/merge shape
//! follows the original (leaf entries carry `(pageId, slotId, key)`,
//! internal entries carry `(maxKey, childPageId)`), adapted to a
//! directional (next-sibling-only, within-parent) merge policy and a
//! root-overflow path that promotes a `(max_key, new_page)` sibling
//! rather than mutating the root in place.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use crate::buffer::BufferPoolManager;
use crate::common::{FileHandle, OpenFileCache, PageId};
use crate::error::{DbError, Result};

use super::alloc;
use super::node::{self, InternalEntry, LeafEntry, Node, NodeBody};
use super::types::IndexValue;

const HEADER_PAGE: PageId = PageId(0);

struct IndexHeader {
    key_count: usize,
    root_page_id: PageId,
}

fn read_header(bpm: &Rc<RefCell<BufferPoolManager>>, handle: FileHandle) -> Result<IndexHeader> {
    let frame = bpm.borrow_mut().get_page(handle, HEADER_PAGE)?;
    let bpm_ref = bpm.borrow();
    let page = bpm_ref.frame_data(frame);
    let key_count = i32::from_le_bytes(page[0..4].try_into().unwrap()) as usize;
    let root_page_id = PageId::new(i32::from_le_bytes(page[4..8].try_into().unwrap()));
    Ok(IndexHeader { key_count, root_page_id })
}

fn write_header(
    bpm: &Rc<RefCell<BufferPoolManager>>,
    handle: FileHandle,
    header: &IndexHeader,
) -> Result<()> {
    let frame = bpm.borrow_mut().get_page(handle, HEADER_PAGE)?;
    let mut bpm_mut = bpm.borrow_mut();
    let page = bpm_mut.frame_data_mut(frame);
    page[0..4].copy_from_slice(&(header.key_count as i32).to_le_bytes());
    page[4..8].copy_from_slice(&header.root_page_id.0.to_le_bytes());
    bpm_mut.mark_dirty(frame);
    Ok(())
}

fn read_node(
    bpm: &Rc<RefCell<BufferPoolManager>>,
    handle: FileHandle,
    page_id: PageId,
    key_count: usize,
) -> Result<Node> {
    let frame = bpm.borrow_mut().get_page(handle, page_id)?;
    let bpm_ref = bpm.borrow();
    Ok(node::read_node(bpm_ref.frame_data(frame), key_count))
}

fn write_node_at(
    bpm: &Rc<RefCell<BufferPoolManager>>,
    handle: FileHandle,
    page_id: PageId,
    n: &Node,
    key_count: usize,
) -> Result<()> {
    let frame = bpm.borrow_mut().get_page(handle, page_id)?;
    let mut bpm_mut = bpm.borrow_mut();
    let page = bpm_mut.frame_data_mut(frame);
    node::write_node(page, n, key_count);
    bpm_mut.mark_dirty(frame);
    Ok(())
}

/// Outcome of inserting into a subtree rooted at some page: the updated
/// max key of that (unsplit) subtree, plus an optional promoted sibling
/// `(max_key, new_page)` the caller must link in as a new entry.
struct InsertOutcome {
    new_max: Vec<i32>,
    promoted: Option<(Vec<i32>, PageId)>,
}

enum DeleteOutcome {
    Removed { new_max: Vec<i32> },
    Empty,
}

/// B+ tree index over a single file, one tree per file. Reuses the same
/// `Rc<RefCell<BufferPoolManager>>` shared-ownership pattern as
/// [`crate::record::RecordManager`], and keeps its own small LRU of open
/// file handles (§4.7's "Tiered caches").
pub struct IndexManager {
    bpm: Rc<RefCell<BufferPoolManager>>,
    files: OpenFileCache,
    key_counts: HashMap<FileHandle, usize>,
}

impl IndexManager {
    pub fn new(bpm: Rc<RefCell<BufferPoolManager>>) -> Self {
        Self { bpm, files: OpenFileCache::new(), key_counts: HashMap::new() }
    }

    fn handle(&mut self, path: &Path) -> Result<FileHandle> {
        let bpm_rc = self.bpm.clone();
        let mut bpm = bpm_rc.borrow_mut();
        self.files.get_or_open(&mut bpm, path, false)
    }

    fn key_count(&mut self, handle: FileHandle) -> Result<usize> {
        if let Some(&n) = self.key_counts.get(&handle) {
            return Ok(n);
        }
        let header = read_header(&self.bpm, handle)?;
        self.key_counts.insert(handle, header.key_count);
        Ok(header.key_count)
    }

    /// Creates a new index file: an empty bitmap allocation chain (page 1)
    /// and a single empty leaf as the root.
    pub fn initialize(&mut self, path: &Path, key_count: usize) -> Result<()> {
        let bpm_rc = self.bpm.clone();
        {
            let mut bpm = bpm_rc.borrow_mut();
            if !bpm.exists(path) {
                bpm.create_file(path)?;
            }
        }
        let handle = self.handle(path)?;
        alloc::initialize_chain(&bpm_rc, handle)?;
        let root_page = alloc::alloc_page(&bpm_rc, handle)?;
        write_node_at(&bpm_rc, handle, root_page, &Node::new_leaf(PageId::INVALID, PageId::INVALID), key_count)?;
        write_header(&bpm_rc, handle, &IndexHeader { key_count, root_page_id: root_page })?;
        self.key_counts.insert(handle, key_count);
        Ok(())
    }

    fn check_key_len(expected: usize, key: &[i32]) -> Result<()> {
        if key.len() != expected {
            return Err(DbError::IndexKeyCountMismatch { expected, got: key.len() });
        }
        Ok(())
    }

    pub fn insert(&mut self, path: &Path, value: IndexValue) -> Result<()> {
        let handle = self.handle(path)?;
        let key_count = self.key_count(handle)?;
        Self::check_key_len(key_count, &value.key)?;
        let bpm_rc = self.bpm.clone();
        let header = read_header(&bpm_rc, handle)?;

        let outcome = Self::insert_into(&bpm_rc, handle, key_count, header.root_page_id, &value)?;
        if let Some((promoted_max, promoted_page)) = outcome.promoted {
            let new_root_page = alloc::alloc_page(&bpm_rc, handle)?;
            let new_root = Node::new_internal(PageId::INVALID, PageId::INVALID)
                .with_internal(vec![
                    InternalEntry { child: header.root_page_id, max_key: outcome.new_max },
                    InternalEntry { child: promoted_page, max_key: promoted_max },
                ]);
            write_node_at(&bpm_rc, handle, new_root_page, &new_root, key_count)?;
            write_header(&bpm_rc, handle, &IndexHeader { key_count, root_page_id: new_root_page })?;
        }
        Ok(())
    }

    fn insert_into(
        bpm: &Rc<RefCell<BufferPoolManager>>,
        handle: FileHandle,
        key_count: usize,
        page_id: PageId,
        value: &IndexValue,
    ) -> Result<InsertOutcome> {
        let mut n = read_node(bpm, handle, page_id, key_count)?;

        match &mut n.body {
            NodeBody::Leaf(entries) => {
                let pos = entries.partition_point(|e| node::key_cmp(&e.key, &value.key).is_lt());
                entries.insert(pos, LeafEntry { page_id: value.page_id, slot_id: value.slot_id, key: value.key.clone() });

                if entries.len() > node::fan_out(key_count) {
                    let split_at = entries.len() / 2;
                    let right_entries = entries.split_off(split_at);
                    let new_page = alloc::alloc_page(bpm, handle)?;
                    let old_next = n.next;

                    let right = Node { prev: page_id, next: old_next, body: NodeBody::Leaf(right_entries) };
                    n.next = new_page;
                    let new_max = n.max_key().expect("non-empty after split").to_vec();
                    let promoted_max = right.max_key().expect("non-empty after split").to_vec();

                    write_node_at(bpm, handle, page_id, &n, key_count)?;
                    write_node_at(bpm, handle, new_page, &right, key_count)?;
                    if old_next.is_valid() {
                        let mut next_node = read_node(bpm, handle, old_next, key_count)?;
                        next_node.prev = new_page;
                        write_node_at(bpm, handle, old_next, &next_node, key_count)?;
                    }

                    Ok(InsertOutcome { new_max, promoted: Some((promoted_max, new_page)) })
                } else {
                    let new_max = n.max_key().expect("just inserted").to_vec();
                    write_node_at(bpm, handle, page_id, &n, key_count)?;
                    Ok(InsertOutcome { new_max, promoted: None })
                }
            }
            NodeBody::Internal(entries) => {
                let idx = entries
                    .iter()
                    .position(|e| node::key_cmp(&e.max_key, &value.key).is_ge())
                    .unwrap_or(entries.len() - 1);
                let child_page = entries[idx].child;
                let child_outcome = Self::insert_into(bpm, handle, key_count, child_page, value)?;
                entries[idx].max_key = child_outcome.new_max;

                if let Some((promoted_max, promoted_page)) = child_outcome.promoted {
                    entries.insert(idx + 1, InternalEntry { child: promoted_page, max_key: promoted_max });
                }

                if entries.len() > node::fan_out(key_count) {
                    let split_at = entries.len() / 2;
                    let right_entries = entries.split_off(split_at);
                    let new_page = alloc::alloc_page(bpm, handle)?;
                    let old_next = n.next;

                    let right = Node { prev: page_id, next: old_next, body: NodeBody::Internal(right_entries) };
                    n.next = new_page;
                    let new_max = n.max_key().expect("non-empty after split").to_vec();
                    let promoted_max = right.max_key().expect("non-empty after split").to_vec();

                    write_node_at(bpm, handle, page_id, &n, key_count)?;
                    write_node_at(bpm, handle, new_page, &right, key_count)?;

                    Ok(InsertOutcome { new_max, promoted: Some((promoted_max, new_page)) })
                } else {
                    let new_max = n.max_key().expect("non-empty").to_vec();
                    write_node_at(bpm, handle, page_id, &n, key_count)?;
                    Ok(InsertOutcome { new_max, promoted: None })
                }
            }
        }
    }

    pub fn delete(&mut self, path: &Path, value: &IndexValue, exact_match: bool) -> Result<()> {
        let handle = self.handle(path)?;
        let key_count = self.key_count(handle)?;
        Self::check_key_len(key_count, &value.key)?;
        let bpm_rc = self.bpm.clone();
        let header = read_header(&bpm_rc, handle)?;

        let outcome = Self::delete_from(&bpm_rc, handle, key_count, header.root_page_id, value, exact_match)?;
        if let DeleteOutcome::Removed { .. } = outcome {
            let root = read_node(&bpm_rc, handle, header.root_page_id, key_count)?;
            if let NodeBody::Internal(entries) = &root.body {
                if entries.len() == 1 {
                    let only_child = entries[0].child;
                    alloc::free_page(&bpm_rc, handle, header.root_page_id)?;
                    write_header(&bpm_rc, handle, &IndexHeader { key_count, root_page_id: only_child })?;
                }
            }
        }
        Ok(())
    }

    fn delete_from(
        bpm: &Rc<RefCell<BufferPoolManager>>,
        handle: FileHandle,
        key_count: usize,
        page_id: PageId,
        value: &IndexValue,
        exact_match: bool,
    ) -> Result<DeleteOutcome> {
        let mut n = read_node(bpm, handle, page_id, key_count)?;

        match &mut n.body {
            NodeBody::Leaf(entries) => {
                let pos = entries.iter().position(|e| {
                    node::key_cmp(&e.key, &value.key).is_eq()
                        && (!exact_match || (e.page_id == value.page_id && e.slot_id == value.slot_id))
                });
                let pos = pos.ok_or(DbError::IndexEntryNotFound)?;
                entries.remove(pos);

                if entries.is_empty() {
                    if n.prev.is_valid() {
                        let mut prev_node = read_node(bpm, handle, n.prev, key_count)?;
                        prev_node.next = n.next;
                        write_node_at(bpm, handle, n.prev, &prev_node, key_count)?;
                    }
                    if n.next.is_valid() {
                        let mut next_node = read_node(bpm, handle, n.next, key_count)?;
                        next_node.prev = n.prev;
                        write_node_at(bpm, handle, n.next, &next_node, key_count)?;
                    }
                    write_node_at(bpm, handle, page_id, &n, key_count)?;
                    Ok(DeleteOutcome::Empty)
                } else {
                    let new_max = n.max_key().expect("non-empty").to_vec();
                    write_node_at(bpm, handle, page_id, &n, key_count)?;
                    Ok(DeleteOutcome::Removed { new_max })
                }
            }
            NodeBody::Internal(entries) => {
                let idx = entries
                    .iter()
                    .position(|e| node::key_cmp(&e.max_key, &value.key).is_ge())
                    .unwrap_or(entries.len() - 1);
                let child_page = entries[idx].child;
                let child_outcome = Self::delete_from(bpm, handle, key_count, child_page, value, exact_match)?;

                match child_outcome {
                    DeleteOutcome::Empty => {
                        alloc::free_page(bpm, handle, child_page)?;
                        entries.remove(idx);
                    }
                    DeleteOutcome::Removed { new_max } => {
                        entries[idx].max_key = new_max;
                        Self::maybe_merge_with_next(bpm, handle, key_count, entries, idx)?;
                    }
                }

                if entries.is_empty() {
                    write_node_at(bpm, handle, page_id, &n, key_count)?;
                    Ok(DeleteOutcome::Empty)
                } else {
                    let new_max = n.max_key().expect("non-empty").to_vec();
                    write_node_at(bpm, handle, page_id, &n, key_count)?;
                    Ok(DeleteOutcome::Removed { new_max })
                }
            }
        }
    }

    /// Directional, within-parent merge: if the child at `idx` is
    /// underfull and its immediate next sibling (also a child of this
    /// same parent) would fit alongside it in one page, merge the
    /// sibling's entries into it and drop the sibling's parent entry.
    fn maybe_merge_with_next(
        bpm: &Rc<RefCell<BufferPoolManager>>,
        handle: FileHandle,
        key_count: usize,
        entries: &mut Vec<InternalEntry>,
        idx: usize,
    ) -> Result<()> {
        let min_entries = node::fan_out(key_count) / 2;
        if idx + 1 >= entries.len() {
            return Ok(());
        }
        let child_page = entries[idx].child;
        let mut child = read_node(bpm, handle, child_page, key_count)?;
        if child.child_count() >= min_entries {
            return Ok(());
        }

        let sibling_page = entries[idx + 1].child;
        let sibling = read_node(bpm, handle, sibling_page, key_count)?;
        if child.child_count() + sibling.child_count() > node::fan_out(key_count) {
            return Ok(());
        }

        match (&mut child.body, sibling.body) {
            (NodeBody::Leaf(c), NodeBody::Leaf(s)) => c.extend(s),
            (NodeBody::Internal(c), NodeBody::Internal(s)) => c.extend(s),
            _ => unreachable!("sibling nodes at the same level always share leaf-ness"),
        }
        child.next = sibling.next;
        if sibling.next.is_valid() {
            let mut after = read_node(bpm, handle, sibling.next, key_count)?;
            after.prev = child_page;
            write_node_at(bpm, handle, sibling.next, &after, key_count)?;
        }

        entries[idx].max_key = child.max_key().expect("merge target non-empty").to_vec();
        write_node_at(bpm, handle, child_page, &child, key_count)?;
        alloc::free_page(bpm, handle, sibling_page)?;
        entries.remove(idx + 1);
        Ok(())
    }

    pub fn search(&mut self, path: &Path, key: &[i32]) -> Result<Vec<IndexValue>> {
        let handle = self.handle(path)?;
        let key_count = self.key_count(handle)?;
        Self::check_key_len(key_count, key)?;
        let bpm_rc = self.bpm.clone();
        let header = read_header(&bpm_rc, handle)?;

        let mut leaf_page = Self::descend_to_leaf(&bpm_rc, handle, key_count, header.root_page_id, key)?;
        let mut results = Vec::new();
        loop {
            let n = read_node(&bpm_rc, handle, leaf_page, key_count)?;
            let NodeBody::Leaf(entries) = &n.body else { unreachable!("descend_to_leaf returns a leaf") };
            let mut exhausted_with_match = false;
            for e in entries {
                match node::key_cmp(&e.key, key) {
                    std::cmp::Ordering::Equal => {
                        results.push(IndexValue::new(e.page_id, e.slot_id, e.key.clone()));
                        exhausted_with_match = true;
                    }
                    std::cmp::Ordering::Greater if exhausted_with_match => break,
                    _ => {}
                }
            }
            let last_is_match = entries.last().map(|e| node::key_cmp(&e.key, key).is_eq()).unwrap_or(false);
            if last_is_match && n.next.is_valid() {
                leaf_page = n.next;
            } else {
                break;
            }
        }
        Ok(results)
    }

    pub fn range_search(&mut self, path: &Path, low: &[i32], high: &[i32]) -> Result<Vec<IndexValue>> {
        let handle = self.handle(path)?;
        let key_count = self.key_count(handle)?;
        Self::check_key_len(key_count, low)?;
        Self::check_key_len(key_count, high)?;
        let bpm_rc = self.bpm.clone();
        let header = read_header(&bpm_rc, handle)?;

        let mut leaf_page = Self::descend_to_leaf(&bpm_rc, handle, key_count, header.root_page_id, low)?;
        let mut results = Vec::new();
        'outer: loop {
            let n = read_node(&bpm_rc, handle, leaf_page, key_count)?;
            let NodeBody::Leaf(entries) = &n.body else { unreachable!("descend_to_leaf returns a leaf") };
            for e in entries {
                if node::key_cmp(&e.key, low).is_lt() {
                    continue;
                }
                if node::key_cmp(&e.key, high).is_gt() {
                    break 'outer;
                }
                results.push(IndexValue::new(e.page_id, e.slot_id, e.key.clone()));
            }
            if n.next.is_valid() {
                leaf_page = n.next;
            } else {
                break;
            }
        }
        Ok(results)
    }

    fn descend_to_leaf(
        bpm: &Rc<RefCell<BufferPoolManager>>,
        handle: FileHandle,
        key_count: usize,
        page_id: PageId,
        key: &[i32],
    ) -> Result<PageId> {
        let mut current = page_id;
        loop {
            let n = read_node(bpm, handle, current, key_count)?;
            match n.body {
                NodeBody::Leaf(_) => return Ok(current),
                NodeBody::Internal(entries) => {
                    let idx = entries
                        .iter()
                        .position(|e| node::key_cmp(&e.max_key, key).is_ge())
                        .unwrap_or(entries.len() - 1);
                    current = entries[idx].child;
                }
            }
        }
    }

    /// Close and forget a cached handle for `path` without deleting the
    /// file, flushing dirty pages first (used when a table/database is
    /// being dropped and its files are about to vanish under the cache).
    pub fn close_file(&mut self, path: &Path) -> Result<()> {
        let bpm_rc = self.bpm.clone();
        let mut bpm = bpm_rc.borrow_mut();
        if let Some(handle) = self.files.forget_and_return(&mut bpm, path)? {
            self.key_counts.remove(&handle);
        }
        Ok(())
    }

    pub fn delete_file(&mut self, path: &Path) -> Result<()> {
        let bpm_rc = self.bpm.clone();
        let mut bpm = bpm_rc.borrow_mut();
        self.files.forget(&mut bpm, path)?;
        if bpm.exists(path) {
            let handle = bpm.open_file(path)?;
            bpm.delete_file(handle, path)?;
        }
        Ok(())
    }

    pub fn close_all(&mut self) -> Result<()> {
        let bpm_rc = self.bpm.clone();
        let mut bpm = bpm_rc.borrow_mut();
        self.files.close_all(&mut bpm)
    }
}

impl Node {
    fn with_internal(mut self, entries: Vec<InternalEntry>) -> Self {
        self.body = NodeBody::Internal(entries);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup(key_count: usize) -> (IndexManager, std::path::PathBuf, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("idx.db");
        let bpm = Rc::new(RefCell::new(BufferPoolManager::with_capacity(64)));
        let mut mgr = IndexManager::new(bpm);
        mgr.initialize(&path, key_count).unwrap();
        (mgr, path, dir)
    }

    #[test]
    fn insert_then_search_finds_exact_key() {
        let (mut mgr, path, _dir) = setup(1);
        mgr.insert(&path, IndexValue::new(PageId::new(2), 0, vec![10])).unwrap();
        mgr.insert(&path, IndexValue::new(PageId::new(2), 1, vec![20])).unwrap();
        let found = mgr.search(&path, &[10]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slot_id, 0);
    }

    #[test]
    fn range_search_returns_sorted_matches_across_splits() {
        let (mut mgr, path, _dir) = setup(1);
        for i in 0..500 {
            mgr.insert(&path, IndexValue::new(PageId::new(2), i as u32, vec![i])).unwrap();
        }
        let found = mgr.range_search(&path, &[100], &[110]).unwrap();
        let keys: Vec<i32> = found.iter().map(|v| v.key[0]).collect();
        assert_eq!(keys, (100..=110).collect::<Vec<_>>());
    }

    #[test]
    fn delete_then_search_finds_nothing() {
        let (mut mgr, path, _dir) = setup(1);
        let v = IndexValue::new(PageId::new(2), 0, vec![42]);
        mgr.insert(&path, v.clone()).unwrap();
        mgr.delete(&path, &v, true).unwrap();
        assert!(mgr.search(&path, &[42]).unwrap().is_empty());
    }

    #[test]
    fn bulk_insert_and_delete_survives_splits_and_merges() {
        let (mut mgr, path, _dir) = setup(1);
        let values: Vec<IndexValue> =
            (0..800).map(|i| IndexValue::new(PageId::new(2), i as u32, vec![i])).collect();
        for v in &values {
            mgr.insert(&path, v.clone()).unwrap();
        }
        for v in values.iter().step_by(2) {
            mgr.delete(&path, v, true).unwrap();
        }
        for v in values.iter().skip(1).step_by(2) {
            assert_eq!(mgr.search(&path, &v.key).unwrap().len(), 1);
        }
        for v in values.iter().step_by(2) {
            assert!(mgr.search(&path, &v.key).unwrap().is_empty());
        }
    }
}
