//! Record-level storage manager.
//!
//! Composes the page cache, the WAL, and the free-space index into the
//! insert/read surface the version layer builds on. Data items are served
//! through an unbounded [`ResourceCache`] keyed by uid, each cached item
//! pinning its page for as long as a handle is alive.

use std::path::Path;
use std::sync::Arc;

use log::info;

use crate::cache::{CacheBackend, CacheRef, ResourceCache};
use crate::data::item::{self, DataItem};
use crate::data::Uid;
use crate::error::{Error, Result};
use crate::recovery;
use crate::storage::page::{data_page, first_page};
use crate::storage::page_cache::{PageCache, PageRef};
use crate::storage::page_index::PageIndex;
use crate::storage::wal::{LogRecord, Logger};
use crate::transaction::{TransactionManager, Xid};

/// Page allocations attempted before an insert gives up.
const MAX_INSERT_ATTEMPTS: usize = 5;

pub struct ItemBackend {
    page_cache: PageCache,
    logger: Arc<Logger>,
}

impl CacheBackend for ItemBackend {
    type Item = DataItem;

    fn load(&self, key: u64) -> Result<DataItem> {
        let uid = Uid(key);
        let page = self.page_cache.get_page(uid.pgno())?;
        Ok(DataItem::new(uid, page, Arc::clone(&self.logger)))
    }

    // Dropping the item unpins its page; the page cache handles write-back.
    fn evict(&self, _key: u64, _item: &DataItem) -> Result<()> {
        Ok(())
    }
}

/// Handle to a cached data item.
pub type ItemRef = CacheRef<ItemBackend>;

pub struct DataManager {
    page_cache: PageCache,
    logger: Arc<Logger>,
    page_index: PageIndex,
    items: ResourceCache<ItemBackend>,
    /// Page 1 stays pinned for the manager's whole lifetime.
    first_page: PageRef,
}

impl DataManager {
    /// Creates a fresh store: empty data file, empty log, page 1 allocated
    /// and stamped open.
    pub fn create(path: &Path, mem: u64) -> Result<Self> {
        let page_cache = PageCache::create(path, mem)?;
        let logger = Arc::new(Logger::create(path)?);

        let pgno = page_cache.new_page(first_page::init())?;
        debug_assert_eq!(pgno, 1);
        let first_page = page_cache.get_page(pgno)?;

        Ok(Self::assemble(page_cache, logger, first_page))
    }

    /// Opens an existing store, running crash recovery first when the
    /// previous shutdown was unclean.
    pub fn open(path: &Path, mem: u64, tm: &TransactionManager) -> Result<Self> {
        let page_cache = PageCache::open(path, mem)?;
        let logger = Arc::new(Logger::open(path)?);

        let first_page = page_cache.get_page(1)?;
        if !first_page::is_clean(&first_page) {
            info!("unclean shutdown detected, running recovery");
            recovery::recover(tm, &logger, &page_cache)?;
        }

        let dm = Self::assemble(page_cache, logger, first_page);
        dm.fill_page_index()?;

        first_page::set_open(&dm.first_page);
        dm.page_cache.flush_page(&dm.first_page)?;
        Ok(dm)
    }

    fn assemble(page_cache: PageCache, logger: Arc<Logger>, first_page: PageRef) -> Self {
        let backend = ItemBackend {
            page_cache: page_cache.clone(),
            logger: Arc::clone(&logger),
        };
        Self {
            page_cache,
            logger,
            page_index: PageIndex::new(),
            items: ResourceCache::new(backend, 0),
            first_page,
        }
    }

    fn fill_page_index(&self) -> Result<()> {
        for pgno in 2..=self.page_cache.page_count() {
            let page = self.page_cache.get_page(pgno)?;
            self.page_index.add(pgno, data_page::free_space(&page));
        }
        Ok(())
    }

    /// Returns the live record at `uid`, or `None` when its valid flag has
    /// been cleared by an undo.
    pub fn read(&self, uid: Uid) -> Result<Option<ItemRef>> {
        let item = self.items.get(uid.raw())?;
        if item.is_valid() {
            Ok(Some(item))
        } else {
            Ok(None)
        }
    }

    /// Stores `data` in some page with room, logging the insert before the
    /// page is touched. Returns the record's uid.
    pub fn insert(&self, xid: Xid, data: &[u8]) -> Result<Uid> {
        if data.len() > item::MAX_DATA_SIZE {
            return Err(Error::DataTooLarge);
        }
        let raw = item::wrap(data);

        let mut slot = None;
        let mut too_small = Vec::new();
        for _ in 0..MAX_INSERT_ATTEMPTS {
            match self.page_index.select(raw.len()) {
                // The top interval also holds pages with slightly less room
                // than a maximum-size record, so the slot must be re-checked.
                Some(found) if found.free_space >= raw.len() => {
                    slot = Some(found);
                    break;
                }
                Some(short) => too_small.push(short),
                None => {
                    let pgno = self.page_cache.new_page(data_page::init())?;
                    self.page_index.add(pgno, data_page::MAX_FREE_SPACE);
                }
            }
        }
        for short in too_small {
            self.page_index.add(short.pgno, short.free_space);
        }
        let slot = slot.ok_or(Error::DatabaseBusy)?;

        // The selected page is out of the index until re-added below, so no
        // concurrent insert can target it.
        let inserted = (|| -> Result<(Uid, usize)> {
            let page = self.page_cache.get_page(slot.pgno)?;
            let offset = data_page::fso(&page);
            let record = LogRecord::insert(xid, slot.pgno, offset, raw.clone());
            self.logger.log(&record.encode())?;

            let offset = data_page::insert(&page, &raw);
            Ok((Uid::new(slot.pgno, offset), data_page::free_space(&page)))
        })();

        match inserted {
            Ok((uid, free_space)) => {
                self.page_index.add(slot.pgno, free_space);
                Ok(uid)
            }
            Err(e) => {
                self.page_index.add(slot.pgno, slot.free_space);
                Err(e)
            }
        }
    }

    /// Flushes everything and stamps page 1 for a clean shutdown.
    pub fn close(&self) -> Result<()> {
        self.items.close()?;
        first_page::set_closed(&self.first_page);
        self.page_cache.flush_page(&self.first_page)?;
        self.page_cache.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::item::set_raw_invalid;
    use tempfile::tempdir;

    const MEM: u64 = 1 << 20;

    #[test]
    fn test_insert_and_read() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let dm = DataManager::create(&base, MEM).unwrap();
        let uid = dm.insert(Xid(1), b"some record").unwrap();

        let item = dm.read(uid).unwrap().unwrap();
        assert_eq!(item.data(), b"some record");
    }

    #[test]
    fn test_read_skips_invalidated_record() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let dm = DataManager::create(&base, MEM).unwrap();
        let uid = dm.insert(Xid(1), b"doomed").unwrap();

        {
            let item = dm.read(uid).unwrap().unwrap();
            let mut guard = item.before();
            set_raw_invalid(guard.raw_mut());
            guard.commit(Xid(1)).unwrap();
        }
        assert!(dm.read(uid).unwrap().is_none());
    }

    #[test]
    fn test_max_size_insert_skips_partly_filled_page() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let dm = DataManager::create(&base, MEM).unwrap();

        // Leaves the first data page in the top free-space interval with a
        // little less room than a maximum-size record needs.
        let small = dm.insert(Xid(1), b"x").unwrap();
        let full = vec![7u8; item::MAX_DATA_SIZE];
        let uid = dm.insert(Xid(1), &full).unwrap();

        assert_ne!(uid.pgno(), small.pgno());
        let item = dm.read(uid).unwrap().unwrap();
        assert_eq!(item.data(), &full[..]);
    }

    #[test]
    fn test_oversized_insert_rejected() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let dm = DataManager::create(&base, MEM).unwrap();
        let huge = vec![0u8; item::MAX_DATA_SIZE + 1];
        assert!(matches!(dm.insert(Xid(1), &huge), Err(Error::DataTooLarge)));
    }

    #[test]
    fn test_data_survives_clean_restart() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let tm = TransactionManager::create(&base).unwrap();

        let uid = {
            let dm = DataManager::create(&base, MEM).unwrap();
            let uid = dm.insert(Xid(1), b"durable").unwrap();
            dm.close().unwrap();
            uid
        };

        let dm = DataManager::open(&base, MEM, &tm).unwrap();
        let item = dm.read(uid).unwrap().unwrap();
        assert_eq!(item.data(), b"durable");
        dm.close().unwrap();
    }
}
