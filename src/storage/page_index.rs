//! Free-space index for picking insert targets.
//!
//! Pages are partitioned into 41 buckets by their remaining free space, in
//! steps of `PAGE_SIZE / 40`. Selection removes the entry; the caller must
//! add the page back with its updated free space once done, so a checked-out
//! page is never handed to two inserters at once.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::storage::PAGE_SIZE;

const INTERVALS: usize = 40;
const THRESHOLD: usize = PAGE_SIZE / INTERVALS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlot {
    pub pgno: u32,
    pub free_space: usize,
}

pub struct PageIndex {
    buckets: Mutex<Vec<VecDeque<PageSlot>>>,
}

impl PageIndex {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(vec![VecDeque::new(); INTERVALS + 1]),
        }
    }

    /// Registers (or re-registers) a page under its free-space bucket.
    pub fn add(&self, pgno: u32, free_space: usize) {
        let mut buckets = self.buckets.lock();
        let number = free_space / THRESHOLD;
        buckets[number].push_back(PageSlot { pgno, free_space });
    }

    /// Removes and returns a page with at least `space` bytes free, or
    /// `None` if no registered page fits.
    pub fn select(&self, space: usize) -> Option<PageSlot> {
        let mut buckets = self.buckets.lock();
        let mut number = space / THRESHOLD;
        if number < INTERVALS {
            number += 1;
        }
        while number <= INTERVALS {
            if let Some(slot) = buckets[number].pop_front() {
                return Some(slot);
            }
            number += 1;
        }
        None
    }
}

impl Default for PageIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_removes_entry() {
        let index = PageIndex::new();
        index.add(2, 4000);

        let slot = index.select(1000).unwrap();
        assert_eq!(slot.pgno, 2);
        assert_eq!(slot.free_space, 4000);

        // Checked out; a second select sees nothing.
        assert!(index.select(1000).is_none());
    }

    #[test]
    fn test_select_skips_too_small_pages() {
        let index = PageIndex::new();
        index.add(2, THRESHOLD); // bucket 1

        // Asking for more than a full bucket's worth skips page 2.
        assert!(index.select(THRESHOLD * 2).is_none());
        assert!(index.select(10).is_some());
    }

    #[test]
    fn test_scans_upward_through_buckets() {
        let index = PageIndex::new();
        index.add(2, THRESHOLD * 3);
        index.add(3, THRESHOLD * 20);

        let slot = index.select(THRESHOLD * 10).unwrap();
        assert_eq!(slot.pgno, 3);
    }

    #[test]
    fn test_full_page_bucket() {
        let index = PageIndex::new();
        index.add(2, PAGE_SIZE - 2);
        let slot = index.select(PAGE_SIZE - 2).unwrap();
        assert_eq!(slot.pgno, 2);
    }
}
