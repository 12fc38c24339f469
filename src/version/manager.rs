//! Transaction-facing MVCC surface.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use log::info;
use parking_lot::Mutex;

use crate::cache::{CacheBackend, ResourceCache};
use crate::data::{DataManager, Uid};
use crate::error::{Error, Result};
use crate::transaction::{TransactionManager, Xid, SUPER_XID};
use crate::version::{entry, visibility, Entry, IsolationLevel, Transaction};
use crate::version::lock_table::LockTable;

pub struct EntryBackend {
    dm: Arc<DataManager>,
}

impl CacheBackend for EntryBackend {
    type Item = Entry;

    fn load(&self, key: u64) -> Result<Entry> {
        let uid = Uid(key);
        match self.dm.read(uid)? {
            Some(item) => Ok(Entry::new(uid, item)),
            None => Err(Error::NullEntry),
        }
    }

    fn evict(&self, _key: u64, _entry: &Entry) -> Result<()> {
        Ok(())
    }
}

pub struct VersionManager {
    tm: Arc<TransactionManager>,
    dm: Arc<DataManager>,
    entries: ResourceCache<EntryBackend>,
    active: DashMap<Xid, Arc<Transaction>>,
    lock_table: LockTable,
    /// Serializes begin so a snapshot and its xid are taken atomically.
    begin_lock: Mutex<()>,
}

impl VersionManager {
    pub fn new(tm: Arc<TransactionManager>, dm: Arc<DataManager>) -> Self {
        let active = DashMap::new();
        active.insert(
            SUPER_XID,
            Arc::new(Transaction::new(
                SUPER_XID,
                IsolationLevel::ReadCommitted,
                HashSet::new(),
            )),
        );
        Self {
            tm,
            dm: Arc::clone(&dm),
            entries: ResourceCache::new(EntryBackend { dm }, 0),
            active,
            lock_table: LockTable::new(),
            begin_lock: Mutex::new(()),
        }
    }

    /// Starts a transaction. Under repeatable read the current active set
    /// becomes the transaction's snapshot.
    pub fn begin(&self, level: IsolationLevel) -> Result<Xid> {
        let _guard = self.begin_lock.lock();
        let xid = self.tm.begin()?;
        let snapshot = match level {
            IsolationLevel::ReadCommitted => HashSet::new(),
            IsolationLevel::RepeatableRead => {
                self.active.iter().map(|e| *e.key()).collect()
            }
        };
        self.active
            .insert(xid, Arc::new(Transaction::new(xid, level, snapshot)));
        Ok(xid)
    }

    /// Returns the payload at `uid` if a version of it is visible to `xid`.
    pub fn read(&self, xid: Xid, uid: Uid) -> Result<Option<Vec<u8>>> {
        let t = self.transaction(xid)?;
        if let Some(err) = t.err() {
            return Err(err);
        }

        let entry = match self.entries.get(uid.raw()) {
            Ok(entry) => entry,
            Err(Error::NullEntry) => return Ok(None),
            Err(err) => return Err(err),
        };
        if visibility::is_visible(&self.tm, &t, &entry)? {
            Ok(Some(entry.data()))
        } else {
            Ok(None)
        }
    }

    /// Stores a new entry created by `xid`.
    pub fn insert(&self, xid: Xid, data: &[u8]) -> Result<Uid> {
        let t = self.transaction(xid)?;
        if let Some(err) = t.err() {
            return Err(err);
        }
        let raw = entry::wrap(xid, data);
        self.dm.insert(xid, &raw)
    }

    /// Deletes the entry at `uid` on behalf of `xid`. Returns false when no
    /// visible version exists or `xid` already deleted it.
    ///
    /// Blocks while another transaction holds the delete lock; a wait that
    /// would deadlock, or a delete that would overwrite a committed delete
    /// this transaction cannot see, auto-aborts the transaction.
    pub fn delete(&self, xid: Xid, uid: Uid) -> Result<bool> {
        let t = self.transaction(xid)?;
        if let Some(err) = t.err() {
            return Err(err);
        }

        let entry = match self.entries.get(uid.raw()) {
            Ok(entry) => entry,
            Err(Error::NullEntry) => return Ok(false),
            Err(err) => return Err(err),
        };
        if !visibility::is_visible(&self.tm, &t, &entry)? {
            return Ok(false);
        }

        match self.lock_table.add(xid, uid) {
            Ok(None) => {}
            Ok(Some(gate)) => gate.wait(),
            Err(err @ Error::Deadlock) => return self.auto_abort(&t, err),
            Err(err) => return Err(err),
        }

        if entry.xmax() == xid {
            return Ok(false);
        }
        if visibility::is_version_skip(&self.tm, &t, &entry)? {
            return self.auto_abort(&t, Error::ConcurrentUpdate);
        }

        entry.set_xmax(xid)?;
        Ok(true)
    }

    /// Commits `xid`; the durable status write in the transaction manager is
    /// the last step, so a crash anywhere earlier still aborts on recovery.
    pub fn commit(&self, xid: Xid) -> Result<()> {
        let t = self.transaction(xid)?;
        if let Some(err) = t.err() {
            return Err(err);
        }
        self.active.remove(&xid);
        self.lock_table.remove(xid);
        self.tm.commit(xid)
    }

    pub fn abort(&self, xid: Xid) -> Result<()> {
        self.intern_abort(xid, false)
    }

    /// Poisons the transaction and rolls it back in place. The transaction
    /// stays in the active table so the client's own commit/abort call still
    /// finds it and observes the poison.
    fn auto_abort<T>(&self, t: &Transaction, err: Error) -> Result<T> {
        info!("auto-aborting {}: {}", t.xid(), err);
        t.set_err(&err);
        self.intern_abort(t.xid(), true)?;
        t.set_auto_aborted();
        Err(err)
    }

    fn intern_abort(&self, xid: Xid, auto: bool) -> Result<()> {
        let t = self.transaction(xid)?;
        if !auto {
            self.active.remove(&xid);
        }
        // Already rolled back by an auto-abort; nothing further to release.
        if t.is_auto_aborted() {
            return Ok(());
        }
        self.lock_table.remove(xid);
        self.tm.abort(xid)
    }

    fn transaction(&self, xid: Xid) -> Result<Arc<Transaction>> {
        self.active
            .get(&xid)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| Error::Other(format!("no active transaction {}", xid)))
    }
}
