//! Reference-counted page cache over the data file.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{CacheBackend, CacheRef, ResourceCache};
use crate::error::{Error, Result};
use crate::storage::{Page, PAGE_SIZE};

/// Suffix appended to the store path for the data file.
pub const DB_SUFFIX: &str = ".db";

/// Minimum number of pages the cache must be able to hold.
const MIN_CACHE_PAGES: usize = 10;

/// The shared data file. Physical I/O is serialized by a single file-level
/// mutex; the allocation counter tracks how many pages the file holds.
struct PageFile {
    file: Mutex<File>,
    page_count: AtomicU32,
}

impl PageFile {
    fn read_page(&self, pgno: u32) -> Result<Box<[u8; PAGE_SIZE]>> {
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_offset(pgno)))?;
        file.read_exact(&mut buf[..])?;
        Ok(buf)
    }

    fn write_page(&self, pgno: u32, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_offset(pgno)))?;
        file.write_all(&data[..])?;
        file.sync_data()?;
        Ok(())
    }
}

fn page_offset(pgno: u32) -> u64 {
    (pgno as u64 - 1) * PAGE_SIZE as u64
}

fn db_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(DB_SUFFIX);
    PathBuf::from(os)
}

pub struct PageBackend {
    file: Arc<PageFile>,
}

impl CacheBackend for PageBackend {
    type Item = Page;

    fn load(&self, key: u64) -> Result<Page> {
        let pgno = key as u32;
        let data = self.file.read_page(pgno)?;
        Ok(Page::new(pgno, data))
    }

    fn evict(&self, _key: u64, page: &Page) -> Result<()> {
        if page.take_dirty() {
            self.file.write_page(page.pgno(), &page.read_data())?;
        }
        Ok(())
    }
}

/// Handle to a cached page; dropping it releases the page, flushing it if
/// it was the last reference and the page is dirty.
pub type PageRef = CacheRef<PageBackend>;

#[derive(Clone)]
pub struct PageCache {
    cache: ResourceCache<PageBackend>,
    file: Arc<PageFile>,
}

impl PageCache {
    /// Creates a fresh, empty data file at `<path>.db`. `mem` is the cache
    /// budget in bytes.
    pub fn create(path: &Path, mem: u64) -> Result<Self> {
        let file_path = db_path(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&file_path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    Error::FileExists(file_path.display().to_string())
                }
                _ => Error::Io(e),
            })?;
        Self::with_file(file, 0, mem)
    }

    /// Opens an existing data file.
    pub fn open(path: &Path, mem: u64) -> Result<Self> {
        let file_path = db_path(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&file_path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    Error::FileNotExists(file_path.display().to_string())
                }
                _ => Error::Io(e),
            })?;
        let pages = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;
        Self::with_file(file, pages, mem)
    }

    fn with_file(file: File, pages: u32, mem: u64) -> Result<Self> {
        let max_pages = (mem / PAGE_SIZE as u64) as usize;
        if max_pages < MIN_CACHE_PAGES {
            return Err(Error::MemTooSmall(MIN_CACHE_PAGES));
        }
        let shared = Arc::new(PageFile {
            file: Mutex::new(file),
            page_count: AtomicU32::new(pages),
        });
        Ok(Self {
            cache: ResourceCache::new(
                PageBackend {
                    file: Arc::clone(&shared),
                },
                max_pages,
            ),
            file: shared,
        })
    }

    /// Allocates the next page number and immediately persists `init` as
    /// its contents. New pages are never left un-persisted.
    pub fn new_page(&self, init: Box<[u8; PAGE_SIZE]>) -> Result<u32> {
        let pgno = self.file.page_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.file.write_page(pgno, &init)?;
        Ok(pgno)
    }

    pub fn get_page(&self, pgno: u32) -> Result<PageRef> {
        self.cache.get(pgno as u64)
    }

    /// Unconditionally writes the page back, clearing its dirty flag. Used
    /// for page 1 and at controlled checkpoints.
    pub fn flush_page(&self, page: &Page) -> Result<()> {
        page.take_dirty();
        self.file.write_page(page.pgno(), &page.read_data())
    }

    /// Truncates the file to `max_pgno` pages and resets the allocation
    /// counter. Recovery only; never called during normal operation.
    pub fn truncate_to(&self, max_pgno: u32) -> Result<()> {
        let file = self.file.file.lock();
        file.set_len(max_pgno as u64 * PAGE_SIZE as u64)?;
        self.file.page_count.store(max_pgno, Ordering::SeqCst);
        Ok(())
    }

    pub fn page_count(&self) -> u32 {
        self.file.page_count.load(Ordering::SeqCst)
    }

    /// Flushes and drops every cached page. Shutdown only.
    pub fn close(&self) -> Result<()> {
        self.cache.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEST_MEM: u64 = (PAGE_SIZE * 16) as u64;

    #[test]
    fn test_new_page_is_persisted() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let pc = PageCache::create(&base, TEST_MEM).unwrap();

        let mut init = Box::new([0u8; PAGE_SIZE]);
        init[0] = 7;
        let pgno = pc.new_page(init).unwrap();
        assert_eq!(pgno, 1);
        assert_eq!(pc.page_count(), 1);
        drop(pc);

        let pc = PageCache::open(&base, TEST_MEM).unwrap();
        assert_eq!(pc.page_count(), 1);
        let page = pc.get_page(1).unwrap();
        assert_eq!(page.read_data()[0], 7);
    }

    #[test]
    fn test_dirty_page_flushed_on_release() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let pc = PageCache::create(&base, TEST_MEM).unwrap();
        let pgno = pc.new_page(Box::new([0u8; PAGE_SIZE])).unwrap();

        {
            let page = pc.get_page(pgno).unwrap();
            page.write_data()[100] = 42;
            page.set_dirty();
        }

        // The release above evicted and flushed; a fresh cache sees it.
        let pc2 = PageCache::open(&base, TEST_MEM).unwrap();
        let page = pc2.get_page(pgno).unwrap();
        assert_eq!(page.read_data()[100], 42);
    }

    #[test]
    fn test_truncate_resets_counter() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let pc = PageCache::create(&base, TEST_MEM).unwrap();
        for _ in 0..4 {
            pc.new_page(Box::new([0u8; PAGE_SIZE])).unwrap();
        }
        assert_eq!(pc.page_count(), 4);

        pc.truncate_to(2).unwrap();
        assert_eq!(pc.page_count(), 2);
        assert_eq!(pc.new_page(Box::new([0u8; PAGE_SIZE])).unwrap(), 3);
    }

    #[test]
    fn test_minimum_capacity() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        assert!(matches!(
            PageCache::create(&base, PAGE_SIZE as u64),
            Err(Error::MemTooSmall(_))
        ));
    }
}
