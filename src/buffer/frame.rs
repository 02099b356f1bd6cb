//! Frame - a slot in the buffer pool.
//!
//! Single-threaded cooperative model (§5): no locks, no pin counts. A
//! frame simply holds a page buffer plus the `(handle, page_id)` it
//! currently caches, or `None` if empty.

use crate::common::{FileHandle, PageId};
use crate::storage::page::Page;

pub struct Frame {
    page: Page,
    occupant: Option<(FileHandle, PageId)>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            page: Page::new(),
            occupant: None,
        }
    }

    #[inline]
    pub fn page(&self) -> &Page {
        &self.page
    }

    #[inline]
    pub fn page_mut(&mut self) -> &mut Page {
        &mut self.page
    }

    #[inline]
    pub fn occupant(&self) -> Option<(FileHandle, PageId)> {
        self.occupant
    }

    #[inline]
    pub fn set_occupant(&mut self, occupant: Option<(FileHandle, PageId)>) {
        self.occupant = occupant;
    }

    pub fn is_empty(&self) -> bool {
        self.occupant.is_none()
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_frame_is_empty() {
        let frame = Frame::new();
        assert!(frame.is_empty());
        assert_eq!(frame.occupant(), None);
    }

    #[test]
    fn occupant_roundtrip() {
        let mut frame = Frame::new();
        frame.set_occupant(Some((FileHandle::new(1), PageId::new(3))));
        assert_eq!(frame.occupant(), Some((FileHandle::new(1), PageId::new(3))));
        assert!(!frame.is_empty());
    }

    #[test]
    fn page_access() {
        let mut frame = Frame::new();
        frame.page_mut().as_mut_slice()[0] = 0xAB;
        assert_eq!(frame.page().as_slice()[0], 0xAB);
    }
}
