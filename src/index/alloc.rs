//! Page allocation for index files: a chain of bitmap pages starting at
//! file page 1 (page 0 holds the index header). Each bitmap page tracks
//! `INDEX_BITMAP_PAGE_BYTE_LEN * 8` page ids, with a 4-byte "next bitmap
//! page" link in its last 4 bytes. Grounded on `common::bitops::BitMap`
//! and the allocation-bitmap idiom used by `buffer::FileStore`'s free list.

use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::BufferPoolManager;
use crate::common::bitops;
use crate::common::config::{INDEX_BITMAP_PAGE_BYTE_LEN, PAGE_SIZE};
use crate::common::{FileHandle, PageId};
use crate::error::{DbError, Result};

const BITS_PER_CHAIN_PAGE: usize = INDEX_BITMAP_PAGE_BYTE_LEN * 8;
const FIRST_BITMAP_PAGE: i32 = 1;
const FIRST_TRACKED_PAGE: i32 = 2;

fn bitmap_words(page: &[u8]) -> Vec<u32> {
    page[..INDEX_BITMAP_PAGE_BYTE_LEN]
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn write_bitmap_words(page: &mut [u8], words: &[u32]) {
    for (i, w) in words.iter().enumerate() {
        page[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
    }
}

fn next_link(page: &[u8]) -> i32 {
    let b = &page[INDEX_BITMAP_PAGE_BYTE_LEN..INDEX_BITMAP_PAGE_BYTE_LEN + 4];
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn set_next_link(page: &mut [u8], next: i32) {
    page[INDEX_BITMAP_PAGE_BYTE_LEN..INDEX_BITMAP_PAGE_BYTE_LEN + 4]
        .copy_from_slice(&next.to_le_bytes());
}

/// Allocates a fresh page in `handle`'s file, extending the bitmap chain
/// if every existing chain page is full.
pub fn alloc_page(bpm: &Rc<RefCell<BufferPoolManager>>, handle: FileHandle) -> Result<PageId> {
    let mut chain_page = FIRST_BITMAP_PAGE;
    let mut base = FIRST_TRACKED_PAGE;

    loop {
        let frame = bpm.borrow_mut().get_page(handle, PageId::new(chain_page))?;
        let bit = {
            let bpm_ref = bpm.borrow();
            let page = bpm_ref.frame_data(frame);
            let words = bitmap_words(page);
            bitops::find_first_zero_in(&words)
        };

        if bit >= 0 && (bit as usize) < BITS_PER_CHAIN_PAGE {
            let mut bpm_mut = bpm.borrow_mut();
            let page = bpm_mut.frame_data_mut(frame);
            let mut words = bitmap_words(page);
            bitops::set_bit(&mut words, bit as usize, true);
            write_bitmap_words(page, &words);
            bpm_mut.mark_dirty(frame);
            return Ok(PageId::new(base + bit));
        }

        let next = {
            let bpm_ref = bpm.borrow();
            next_link(bpm_ref.frame_data(frame))
        };

        if next >= 0 {
            base += BITS_PER_CHAIN_PAGE as i32;
            chain_page = next;
            continue;
        }

        let new_bitmap_page = base + BITS_PER_CHAIN_PAGE as i32;
        let new_frame = bpm.borrow_mut().get_page(handle, PageId::new(new_bitmap_page))?;
        {
            let mut bpm_mut = bpm.borrow_mut();
            let page = bpm_mut.frame_data_mut(new_frame);
            page.fill(0);
            set_next_link(page, -1);
            bpm_mut.mark_dirty(new_frame);
        }
        {
            let mut bpm_mut = bpm.borrow_mut();
            let page = bpm_mut.frame_data_mut(frame);
            set_next_link(page, new_bitmap_page);
            bpm_mut.mark_dirty(frame);
        }
        base = new_bitmap_page + 1;
        chain_page = new_bitmap_page;
    }
}

/// Clears the allocation bit for `page_id`, making it reusable.
pub fn free_page(
    bpm: &Rc<RefCell<BufferPoolManager>>,
    handle: FileHandle,
    page_id: PageId,
) -> Result<()> {
    let mut chain_page = FIRST_BITMAP_PAGE;
    let mut base = FIRST_TRACKED_PAGE;

    loop {
        if page_id.0 >= base && (page_id.0 - base) < BITS_PER_CHAIN_PAGE as i32 {
            let bit = (page_id.0 - base) as usize;
            let frame = bpm.borrow_mut().get_page(handle, PageId::new(chain_page))?;
            let mut bpm_mut = bpm.borrow_mut();
            let page = bpm_mut.frame_data_mut(frame);
            let mut words = bitmap_words(page);
            bitops::set_bit(&mut words, bit, false);
            write_bitmap_words(page, &words);
            bpm_mut.mark_dirty(frame);
            return Ok(());
        }

        let frame = bpm.borrow_mut().get_page(handle, PageId::new(chain_page))?;
        let next = {
            let bpm_ref = bpm.borrow();
            next_link(bpm_ref.frame_data(frame))
        };
        if next < 0 {
            return Err(DbError::Integrity(format!(
                "page {} is outside any tracked allocation range",
                page_id.0
            )));
        }
        base += BITS_PER_CHAIN_PAGE as i32;
        chain_page = next;
    }
}

/// Initializes the bitmap chain for a freshly created index file: a single
/// all-zero bitmap page at file page 1, with no successor.
pub fn initialize_chain(bpm: &Rc<RefCell<BufferPoolManager>>, handle: FileHandle) -> Result<()> {
    let frame = bpm.borrow_mut().get_page(handle, PageId::new(FIRST_BITMAP_PAGE))?;
    let mut bpm_mut = bpm.borrow_mut();
    let page = bpm_mut.frame_data_mut(frame);
    debug_assert_eq!(page.len(), PAGE_SIZE);
    page.fill(0);
    set_next_link(page, -1);
    bpm_mut.mark_dirty(frame);
    Ok(())
}
