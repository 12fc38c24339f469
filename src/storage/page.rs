//! In-memory representation of a cached page.

pub mod data_page;
pub mod first_page;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::storage::PAGE_SIZE;

/// A fixed-size page. The byte buffer is guarded by a read-write lock that
/// also serializes logical access to the records stored inside the page;
/// the dirty flag drives conditional write-back on eviction.
pub struct Page {
    pgno: u32,
    data: RwLock<Box<[u8; PAGE_SIZE]>>,
    dirty: AtomicBool,
}

impl Page {
    pub fn new(pgno: u32, data: Box<[u8; PAGE_SIZE]>) -> Self {
        Self {
            pgno,
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn pgno(&self) -> u32 {
        self.pgno
    }

    pub fn read_data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Grants mutable access to the page bytes. Does not mark the page
    /// dirty; callers do that alongside the mutation.
    pub fn write_data(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    pub fn set_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Returns the dirty flag and clears it.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }
}
