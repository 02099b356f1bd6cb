//! Small LRU cache of open file handles, shared by the record and index
//! managers (§4.7): each keeps one of these, capacity ~10, so that a long
//! sequence of operations spanning many tables/indexes doesn't accumulate an
//! unbounded number of open OS file handles. Evicting an entry closes its
//! handle through the buffer pool first, so any dirty pages of the leaving
//! file are flushed before the handle goes away.

use std::path::{Path, PathBuf};

use crate::buffer::BufferPoolManager;
use crate::common::config::FILE_CACHE_CAPACITY;
use crate::common::FileHandle;
use crate::error::Result;

pub struct OpenFileCache {
    capacity: usize,
    entries: Vec<(PathBuf, FileHandle)>,
}

impl OpenFileCache {
    pub fn new() -> Self {
        Self::with_capacity(FILE_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity, entries: Vec::with_capacity(capacity) }
    }

    /// Look up `path`'s handle, opening (creating if needed) on a miss.
    /// Touches the entry as most-recently-used.
    pub fn get_or_open(
        &mut self,
        bpm: &mut BufferPoolManager,
        path: &Path,
        create_if_missing: bool,
    ) -> Result<FileHandle> {
        if let Some(pos) = self.entries.iter().position(|(p, _)| p == path) {
            let entry = self.entries.remove(pos);
            let handle = entry.1;
            self.entries.push(entry);
            return Ok(handle);
        }

        if self.entries.len() >= self.capacity {
            let (_, evicted) = self.entries.remove(0);
            bpm.close_file(evicted)?;
        }

        let handle = if create_if_missing {
            bpm.open_or_create_file(path)?
        } else {
            bpm.open_file(path)?
        };
        self.entries.push((path.to_path_buf(), handle));
        Ok(handle)
    }

    /// Drop and close the cached handle for `path`, if present. Used when a
    /// file is being deleted out from under the cache.
    pub fn forget(&mut self, bpm: &mut BufferPoolManager, path: &Path) -> Result<()> {
        self.forget_and_return(bpm, path)?;
        Ok(())
    }

    /// As [`Self::forget`], returning the closed handle if one was cached.
    pub fn forget_and_return(
        &mut self,
        bpm: &mut BufferPoolManager,
        path: &Path,
    ) -> Result<Option<FileHandle>> {
        if let Some(pos) = self.entries.iter().position(|(p, _)| p == path) {
            let (_, handle) = self.entries.remove(pos);
            bpm.close_file(handle)?;
            return Ok(Some(handle));
        }
        Ok(None)
    }

    /// Close every cached handle, flushing their dirty pages.
    pub fn close_all(&mut self, bpm: &mut BufferPoolManager) -> Result<()> {
        for (_, handle) in self.entries.drain(..) {
            bpm.close_file(handle)?;
        }
        Ok(())
    }
}

impl Default for OpenFileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reopening_same_path_is_a_cache_hit() {
        let dir = tempdir().unwrap();
        let mut bpm = BufferPoolManager::with_capacity(16);
        let mut cache = OpenFileCache::new();
        let path = dir.path().join("a.db");
        let h1 = cache.get_or_open(&mut bpm, &path, true).unwrap();
        let h2 = cache.get_or_open(&mut bpm, &path, true).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn eviction_closes_oldest_entry() {
        let dir = tempdir().unwrap();
        let mut bpm = BufferPoolManager::with_capacity(16);
        let mut cache = OpenFileCache::with_capacity(2);
        let a = dir.path().join("a.db");
        let b = dir.path().join("b.db");
        let c = dir.path().join("c.db");
        cache.get_or_open(&mut bpm, &a, true).unwrap();
        cache.get_or_open(&mut bpm, &b, true).unwrap();
        cache.get_or_open(&mut bpm, &c, true).unwrap(); // evicts a
        assert_eq!(cache.entries.len(), 2);
        assert!(cache.entries.iter().all(|(p, _)| p != &a));
    }
}
