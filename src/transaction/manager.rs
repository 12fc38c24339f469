//! File-backed transaction manager.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;

use super::id::{Xid, SUPER_XID};
use super::state::TransactionState;
use crate::error::{Error, Result};

/// Suffix appended to the store path for the transaction file.
pub const XID_SUFFIX: &str = ".xid";

/// Length of the transaction-counter header.
const HEADER_LEN: u64 = 8;

/// Bytes per transaction record.
const FIELD_SIZE: u64 = 1;

/// The transaction manager persists the state of every transaction in a
/// fixed-record file and hands out monotonically increasing xids.
///
/// The file layout is `[counter: u64][status: u8]*`, one status byte per
/// xid starting at xid 1. Records are never deleted; the file only grows.
pub struct TransactionManager {
    inner: Mutex<TmInner>,
}

struct TmInner {
    file: File,
    counter: u64,
}

fn xid_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(XID_SUFFIX);
    PathBuf::from(os)
}

fn position_of(xid: Xid) -> u64 {
    HEADER_LEN + (xid.0 - 1) * FIELD_SIZE
}

impl TransactionManager {
    /// Creates a fresh transaction file at `<path>.xid`.
    pub fn create(path: &Path) -> Result<Self> {
        let file_path = xid_path(path);
        let mut file = OpenOptions::new()
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

        file.write_u64::<BigEndian>(0)?;
        file.sync_data()?;

        Ok(Self {
            inner: Mutex::new(TmInner { file, counter: 0 }),
        })
    }

    /// Opens an existing transaction file, validating that its length is
    /// consistent with the stored counter.
    pub fn open(path: &Path) -> Result<Self> {
        let file_path = xid_path(path);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&file_path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    Error::FileNotExists(file_path.display().to_string())
                }
                _ => Error::Io(e),
            })?;

        let len = file.metadata()?.len();
        if len < HEADER_LEN {
            return Err(Error::BadTransactionFile);
        }
        file.seek(SeekFrom::Start(0))?;
        let counter = file.read_u64::<BigEndian>()?;
        if len != HEADER_LEN + counter * FIELD_SIZE {
            return Err(Error::BadTransactionFile);
        }

        Ok(Self {
            inner: Mutex::new(TmInner { file, counter }),
        })
    }

    /// Starts a new transaction and returns its xid. The Active status byte
    /// is persisted before the counter header is advanced, so a crash in
    /// between leaves the new xid outside the counted range.
    pub fn begin(&self) -> Result<Xid> {
        let mut inner = self.inner.lock();
        let xid = Xid(inner.counter + 1);
        inner.write_state(xid, TransactionState::Active)?;
        inner.counter += 1;
        let counter = inner.counter;
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.write_u64::<BigEndian>(counter)?;
        inner.file.sync_data()?;
        Ok(xid)
    }

    pub fn commit(&self, xid: Xid) -> Result<()> {
        self.inner
            .lock()
            .write_state(xid, TransactionState::Committed)
    }

    pub fn abort(&self, xid: Xid) -> Result<()> {
        self.inner
            .lock()
            .write_state(xid, TransactionState::Aborted)
    }

    pub fn is_active(&self, xid: Xid) -> Result<bool> {
        if xid.is_super() {
            return Ok(false);
        }
        Ok(self.state_of(xid)? == TransactionState::Active)
    }

    pub fn is_committed(&self, xid: Xid) -> Result<bool> {
        if xid.is_super() {
            return Ok(true);
        }
        Ok(self.state_of(xid)? == TransactionState::Committed)
    }

    pub fn is_aborted(&self, xid: Xid) -> Result<bool> {
        if xid.is_super() {
            return Ok(false);
        }
        Ok(self.state_of(xid)? == TransactionState::Aborted)
    }

    fn state_of(&self, xid: Xid) -> Result<TransactionState> {
        let mut inner = self.inner.lock();
        if xid.0 > inner.counter {
            return Err(Error::BadTransactionFile);
        }
        inner.file.seek(SeekFrom::Start(position_of(xid)))?;
        let mut buf = [0u8; FIELD_SIZE as usize];
        inner.file.read_exact(&mut buf)?;
        TransactionState::from_byte(buf[0])
    }
}

impl TmInner {
    fn write_state(&mut self, xid: Xid, state: TransactionState) -> Result<()> {
        debug_assert_ne!(xid, SUPER_XID);
        self.file.seek(SeekFrom::Start(position_of(xid)))?;
        self.file.write_all(&[state.to_byte()])?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_begin_commit_abort() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let tm = TransactionManager::create(&base).unwrap();

        let x1 = tm.begin().unwrap();
        let x2 = tm.begin().unwrap();
        assert_eq!(x1, Xid(1));
        assert_eq!(x2, Xid(2));

        assert!(tm.is_active(x1).unwrap());
        tm.commit(x1).unwrap();
        assert!(tm.is_committed(x1).unwrap());
        assert!(!tm.is_active(x1).unwrap());

        tm.abort(x2).unwrap();
        assert!(tm.is_aborted(x2).unwrap());
    }

    #[test]
    fn test_super_xid() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let tm = TransactionManager::create(&base).unwrap();

        assert!(tm.is_committed(SUPER_XID).unwrap());
        assert!(!tm.is_active(SUPER_XID).unwrap());
        assert!(!tm.is_aborted(SUPER_XID).unwrap());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");

        let (x1, x2, x3) = {
            let tm = TransactionManager::create(&base).unwrap();
            let x1 = tm.begin().unwrap();
            let x2 = tm.begin().unwrap();
            let x3 = tm.begin().unwrap();
            tm.commit(x1).unwrap();
            tm.abort(x2).unwrap();
            (x1, x2, x3)
        };

        let tm = TransactionManager::open(&base).unwrap();
        assert!(tm.is_committed(x1).unwrap());
        assert!(tm.is_aborted(x2).unwrap());
        assert!(tm.is_active(x3).unwrap());

        // Counter continues from where it left off.
        assert_eq!(tm.begin().unwrap(), Xid(4));
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        TransactionManager::create(&base).unwrap();
        assert!(matches!(
            TransactionManager::create(&base),
            Err(Error::FileExists(_))
        ));
    }

    #[test]
    fn test_open_rejects_short_file() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        fs::write(xid_path(&base), [0u8; 4]).unwrap();
        assert!(matches!(
            TransactionManager::open(&base),
            Err(Error::BadTransactionFile)
        ));
    }

    #[test]
    fn test_open_rejects_inconsistent_length() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        {
            let tm = TransactionManager::create(&base).unwrap();
            tm.begin().unwrap();
        }
        // One stray byte beyond the counted records.
        let mut bytes = fs::read(xid_path(&base)).unwrap();
        bytes.push(0);
        fs::write(xid_path(&base), bytes).unwrap();

        assert!(matches!(
            TransactionManager::open(&base),
            Err(Error::BadTransactionFile)
        ));
    }
}
