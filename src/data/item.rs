//! A single record pinned inside a cached page.
//!
//! Raw layout inside the page: `[valid: u8][size: u16 BE][payload]`, where
//! `valid == 0` means live and any other value means deleted/undone. Updates
//! go through [`DataItem::before`], which returns a guard holding the page
//! write lock; dropping the guard without committing restores the original
//! bytes, committing logs an update record to the WAL first.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use parking_lot::RwLockWriteGuard;

use crate::data::Uid;
use crate::error::Result;
use crate::storage::page::data_page;
use crate::storage::page_cache::PageRef;
use crate::storage::wal::{LogRecord, Logger};
use crate::storage::PAGE_SIZE;
use crate::transaction::Xid;

pub const OF_VALID: usize = 0;
pub const OF_SIZE: usize = 1;
pub const OF_DATA: usize = 3;

/// Largest payload that fits a fresh data page.
pub const MAX_DATA_SIZE: usize = data_page::MAX_FREE_SPACE - OF_DATA;

/// Prefixes a payload with the valid flag and size header.
pub fn wrap(data: &[u8]) -> Vec<u8> {
    let mut raw = vec![0u8; OF_DATA + data.len()];
    BigEndian::write_u16(&mut raw[OF_SIZE..OF_DATA], data.len() as u16);
    raw[OF_DATA..].copy_from_slice(data);
    raw
}

/// Flips the valid flag of a raw record in place.
pub fn set_raw_invalid(raw: &mut [u8]) {
    raw[OF_VALID] = 1;
}

pub struct DataItem {
    uid: Uid,
    page: PageRef,
    offset: usize,
    /// Full raw length, header included.
    len: usize,
    logger: Arc<Logger>,
}

impl DataItem {
    /// Binds a handle to the record at `uid` inside its (pinned) page.
    pub fn new(uid: Uid, page: PageRef, logger: Arc<Logger>) -> Self {
        let offset = uid.offset() as usize;
        let size = {
            let data = page.read_data();
            BigEndian::read_u16(&data[offset + OF_SIZE..offset + OF_DATA]) as usize
        };
        Self {
            uid,
            page,
            offset,
            len: OF_DATA + size,
            logger,
        }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn is_valid(&self) -> bool {
        self.page.read_data()[self.offset + OF_VALID] == 0
    }

    /// Copies out the payload.
    pub fn data(&self) -> Vec<u8> {
        let data = self.page.read_data();
        data[self.offset + OF_DATA..self.offset + self.len].to_vec()
    }

    fn raw_of(&self, page_data: &[u8; PAGE_SIZE]) -> Vec<u8> {
        page_data[self.offset..self.offset + self.len].to_vec()
    }

    /// Opens the record for mutation. The guard holds the page write lock,
    /// so there is exactly one writer per page at a time; the pre-image is
    /// snapshotted for rollback and for the WAL update record.
    pub fn before(&self) -> ItemWriteGuard<'_> {
        let page_data = self.page.write_data();
        self.page.set_dirty();
        let old_raw = self.raw_of(&page_data);
        ItemWriteGuard {
            item: self,
            page_data,
            old_raw,
            finished: false,
        }
    }
}

/// Exclusive write access to one record. Must end in [`commit`] or roll
/// back (explicitly or on drop) to the snapshotted pre-image.
///
/// [`commit`]: ItemWriteGuard::commit
pub struct ItemWriteGuard<'a> {
    item: &'a DataItem,
    page_data: RwLockWriteGuard<'a, Box<[u8; PAGE_SIZE]>>,
    old_raw: Vec<u8>,
    finished: bool,
}

impl ItemWriteGuard<'_> {
    /// Mutable view of the raw record, header included.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        let offset = self.item.offset;
        &mut self.page_data[offset..offset + self.item.len]
    }

    /// Logs the update to the WAL, then publishes the mutation. The record
    /// hits durable storage before the page can be written back.
    pub fn commit(mut self, xid: Xid) -> Result<()> {
        let new_raw = self.item.raw_of(&self.page_data);
        let old_raw = std::mem::take(&mut self.old_raw);
        let record = LogRecord::update(xid, self.item.uid, old_raw, new_raw);
        self.item.logger.log(&record.encode())?;
        self.finished = true;
        Ok(())
    }

    /// Restores the pre-image.
    pub fn rollback(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        let offset = self.item.offset;
        self.page_data[offset..offset + self.item.len].copy_from_slice(&self.old_raw);
        self.finished = true;
    }
}

impl Drop for ItemWriteGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.restore();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::data_page;
    use crate::storage::page_cache::PageCache;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, DataItem) {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let pc = PageCache::create(&base, 1 << 20).unwrap();
        let logger = Arc::new(Logger::create(&base).unwrap());

        let pgno = pc.new_page(data_page::init()).unwrap();
        let page = pc.get_page(pgno).unwrap();
        let raw = wrap(b"hello world");
        let offset = data_page::insert(&page, &raw);
        let item = DataItem::new(Uid::new(pgno, offset), page, logger);
        (dir, item)
    }

    #[test]
    fn test_wrap_layout() {
        let raw = wrap(b"abc");
        assert_eq!(raw[OF_VALID], 0);
        assert_eq!(BigEndian::read_u16(&raw[OF_SIZE..OF_DATA]), 3);
        assert_eq!(&raw[OF_DATA..], b"abc");
    }

    #[test]
    fn test_read_back() {
        let (_dir, item) = setup();
        assert!(item.is_valid());
        assert_eq!(item.data(), b"hello world");
    }

    #[test]
    fn test_commit_applies_mutation() {
        let (_dir, item) = setup();
        let mut guard = item.before();
        guard.raw_mut()[OF_DATA] = b'H';
        guard.commit(Xid(1)).unwrap();
        assert_eq!(item.data(), b"Hello world");
    }

    #[test]
    fn test_rollback_restores_pre_image() {
        let (_dir, item) = setup();
        let mut guard = item.before();
        guard.raw_mut()[OF_DATA..OF_DATA + 5].copy_from_slice(b"XXXXX");
        guard.rollback();
        assert_eq!(item.data(), b"hello world");
    }

    #[test]
    fn test_drop_without_commit_rolls_back() {
        let (_dir, item) = setup();
        {
            let mut guard = item.before();
            set_raw_invalid(guard.raw_mut());
        }
        assert!(item.is_valid());
    }
}
