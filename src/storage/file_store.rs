//! FileStore - durable page I/O and directory management (§4.1).
//!
//! Grounded on `original_source/fs/FileManager`. Every page read/write is
//! exactly [`PAGE_SIZE`] bytes, positioned at `page_id * PAGE_SIZE`. Short
//! reads at EOF are treated as zero-filled (a page may be read before its
//! first write, e.g. a heap page the bitmap scan has not reached yet).
//! Handles are small integers minted monotonically; a closed handle is not
//! reused within a process run, mirroring the source's `handle -> fd` table.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::common::config::PAGE_SIZE;
use crate::common::FileHandle;
use crate::error::{DbError, Result};

/// Opens, reads, writes, and deletes fixed-size pages on the host
/// filesystem, and manages the directory tree of databases and tables.
pub struct FileStore {
    open_files: HashMap<FileHandle, File>,
    next_handle: u32,
}

impl FileStore {
    pub fn new() -> Self {
        Self {
            open_files: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Create a new, empty file. Fails if it already exists.
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        match OpenOptions::new().write(true).create_new(true).open(path.as_ref()) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("create_file failed for {:?}: {e}", path.as_ref());
                Err(DbError::Io(e))
            }
        }
    }

    /// Delete a file. Missing files are not an error (idempotent, matching
    /// the source's "return false on failure, caller rarely checks" usage
    /// at drop-table time where the file may already be gone).
    pub fn delete_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if path.as_ref().exists() {
            fs::remove_file(path.as_ref()).map_err(DbError::Io)?;
        }
        Ok(())
    }

    pub fn exists<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().exists()
    }

    /// Open a file for read/write, minting a fresh handle.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<FileHandle> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(DbError::Io)?;
        let handle = FileHandle::new(self.next_handle);
        self.next_handle += 1;
        self.open_files.insert(handle, file);
        debug!("opened {:?} as {handle}", path.as_ref());
        Ok(handle)
    }

    /// Open a file for read/write, creating it first if it does not exist.
    pub fn open_or_create<P: AsRef<Path>>(&mut self, path: P) -> Result<FileHandle> {
        if !path.as_ref().exists() {
            self.create_file(path.as_ref())?;
        }
        self.open(path)
    }

    pub fn close(&mut self, handle: FileHandle) -> Result<()> {
        self.open_files.remove(&handle);
        Ok(())
    }

    fn file_mut(&mut self, handle: FileHandle) -> Result<&mut File> {
        self.open_files
            .get_mut(&handle)
            .ok_or(DbError::InvalidHandle(handle.0))
    }

    /// Read a full page (`PAGE_SIZE` bytes) into `buf` at `offset`. A short
    /// read at EOF zero-fills the remainder rather than erroring, since
    /// pages may be read before their first write.
    pub fn read_page(&mut self, handle: FileHandle, page_id: u32, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = (page_id as u64) * (PAGE_SIZE as u64);
        let file = self.file_mut(handle)?;
        file.seek(SeekFrom::Start(offset)).map_err(DbError::Io)?;
        buf.fill(0);
        let mut cursor = 0usize;
        loop {
            match file.read(&mut buf[cursor..]) {
                Ok(0) => break,
                Ok(n) => {
                    cursor += n;
                    if cursor == buf.len() {
                        break;
                    }
                }
                Err(e) => return Err(DbError::Io(e)),
            }
        }
        Ok(())
    }

    /// Write a full page (`PAGE_SIZE` bytes) from `buf` at `offset`,
    /// extending the file with zeros if `page_id` is beyond the current
    /// end of file.
    pub fn write_page(&mut self, handle: FileHandle, page_id: u32, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let offset = (page_id as u64) * (PAGE_SIZE as u64);
        let file = self.file_mut(handle)?;
        file.seek(SeekFrom::Start(offset)).map_err(DbError::Io)?;
        file.write_all(buf).map_err(DbError::Io)?;
        Ok(())
    }

    pub fn create_folder<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::create_dir_all(path.as_ref()).map_err(DbError::Io)
    }

    /// Recursively delete a folder and everything beneath it.
    pub fn delete_folder<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if path.as_ref().exists() {
            fs::remove_dir_all(path.as_ref()).map_err(DbError::Io)?;
        }
        Ok(())
    }

    pub fn exists_folder<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().is_dir()
    }

    pub fn file_len(&self, handle: FileHandle) -> Result<u64> {
        self.open_files
            .get(&handle)
            .ok_or(DbError::InvalidHandle(handle.0))?
            .metadata()
            .map(|m| m.len())
            .map_err(DbError::Io)
    }

    pub fn page_count(&self, handle: FileHandle) -> Result<u32> {
        Ok((self.file_len(handle)? / PAGE_SIZE as u64) as u32)
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Join path fragments into a `PathBuf`, used by the catalog layer to
/// build `./data/...` paths without repeating `Path::new(...).join(...)`.
pub fn join<P: AsRef<Path>>(base: P, parts: &[&str]) -> PathBuf {
    let mut p = base.as_ref().to_path_buf();
    for part in parts {
        p.push(part);
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_open_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.db");
        let mut fs_ = FileStore::new();
        fs_.create_file(&path).unwrap();
        let h = fs_.open(&path).unwrap();

        let mut buf = [0xABu8; PAGE_SIZE];
        fs_.write_page(h, 0, &buf).unwrap();
        let mut out = [0u8; PAGE_SIZE];
        fs_.read_page(h, 0, &mut out).unwrap();
        assert_eq!(out.as_slice(), buf.as_slice());
        buf.fill(0);
    }

    #[test]
    fn short_read_zero_fills() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.db");
        let mut fs_ = FileStore::new();
        fs_.create_file(&path).unwrap();
        let h = fs_.open(&path).unwrap();

        let mut out = [0xFFu8; PAGE_SIZE];
        fs_.read_page(h, 5, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.db");
        let mut fs_ = FileStore::new();
        fs_.create_file(&path).unwrap();
        assert!(fs_.create_file(&path).is_err());
    }

    #[test]
    fn delete_file_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.db");
        let mut fs_ = FileStore::new();
        fs_.create_file(&path).unwrap();
        fs_.delete_file(&path).unwrap();
        assert!(!fs_.exists(&path));
        // deleting again is not an error
        fs_.delete_file(&path).unwrap();
    }

    #[test]
    fn folder_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub/dir");
        let fs_ = FileStore::new();
        fs_.create_folder(&path).unwrap();
        assert!(fs_.exists_folder(&path));
        fs_.delete_folder(dir.path().join("sub")).unwrap();
        assert!(!fs_.exists_folder(&path));
    }

    #[test]
    fn closed_handle_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.db");
        let mut fs_ = FileStore::new();
        fs_.create_file(&path).unwrap();
        let h = fs_.open(&path).unwrap();
        fs_.close(h).unwrap();
        let mut buf = [0u8; PAGE_SIZE];
        assert!(fs_.read_page(h, 0, &mut buf).is_err());
    }
}
