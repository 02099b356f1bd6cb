//! Page identifier type.
//!
//! The original source addresses pages with a plain `int` and uses `-1` as
//! the "no page" sentinel throughout (B+ tree sibling links, bitmap chain
//! links, etc.) rather than a separate `Option`. This type keeps that
//! convention instead of inventing a `u32` + `u32::MAX` sentinel, since the
//! `-1`-as-absent idiom is load-bearing in the index manager's on-disk
//! node layout (`prev_page_id`/`next_page_id` are written as `-1` bytes).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub i32);

impl PageId {
    pub const INVALID: PageId = PageId(-1);

    #[inline]
    pub fn new(id: i32) -> Self {
        PageId(id)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Page({})", self.0)
        } else {
            write!(f, "Page(INVALID)")
        }
    }
}
