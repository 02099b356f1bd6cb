//! File handle identifier minted by [`crate::storage::FileStore::open`].

use std::fmt;

/// A small integer handle to an open file, multiplexed by the `FileStore`.
///
/// Handles are minted monotonically within a process run and are never
/// reused after `close`, matching the source's `FileManager` convention of
/// not recycling file descriptors table slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(pub u32);

impl FileHandle {
    #[inline]
    pub fn new(id: u32) -> Self {
        FileHandle(id)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}
