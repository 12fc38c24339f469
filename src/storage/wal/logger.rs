//! Append-only log file with bad-tail detection.
//!
//! File layout: `[xchecksum: i32][record]*` where each record is
//! `[size: u32][checksum: i32][data]`. The header checksum accumulates over
//! every framed record; on open the file is re-scanned, the checksum
//! recomputed, and any trailing partial record truncated away.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Suffix appended to the store path for the log file.
pub const LOG_SUFFIX: &str = ".log";

const SEED: i32 = 13331;

/// Bytes of framing before each record's data: size + checksum.
const OF_DATA: u64 = 8;

/// Length of the file header.
const HEADER_LEN: u64 = 4;

pub struct Logger {
    inner: Mutex<LoggerInner>,
}

struct LoggerInner {
    file: File,
    /// Read cursor for the record iterator.
    position: u64,
    /// File length at open time plus everything appended since.
    file_size: u64,
    xchecksum: i32,
}

fn log_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(LOG_SUFFIX);
    PathBuf::from(os)
}

fn checksum(mut check: i32, data: &[u8]) -> i32 {
    for &b in data {
        check = check.wrapping_mul(SEED).wrapping_add(b as i8 as i32);
    }
    check
}

impl Logger {
    /// Creates a fresh log file at `<path>.log` with a zero checksum header.
    pub fn create(path: &Path) -> Result<Self> {
        let file_path = log_path(path);
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

        file.write_i32::<BigEndian>(0)?;
        file.sync_data()?;

        Ok(Self {
            inner: Mutex::new(LoggerInner {
                file,
                position: HEADER_LEN,
                file_size: HEADER_LEN,
                xchecksum: 0,
            }),
        })
    }

    /// Opens an existing log file, validating the running checksum and
    /// truncating any partial trailing record left by a crash.
    pub fn open(path: &Path) -> Result<Self> {
        let file_path = log_path(path);
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

        let file_size = file.metadata()?.len();
        if file_size < HEADER_LEN {
            return Err(Error::BadLogFile);
        }
        file.seek(SeekFrom::Start(0))?;
        let xchecksum = file.read_i32::<BigEndian>()?;

        let mut inner = LoggerInner {
            file,
            position: HEADER_LEN,
            file_size,
            xchecksum,
        };
        inner.check_and_remove_tail()?;

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Appends a record and force-syncs both the record and the updated
    /// header checksum before returning.
    pub fn log(&self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let mut framed = vec![0u8; OF_DATA as usize + data.len()];
        BigEndian::write_u32(&mut framed[0..4], data.len() as u32);
        BigEndian::write_i32(&mut framed[4..8], checksum(0, data));
        framed[OF_DATA as usize..].copy_from_slice(data);

        inner.file.seek(SeekFrom::Start(inner.file_size))?;
        inner.file.write_all(&framed)?;
        inner.file.sync_data()?;
        inner.file_size += framed.len() as u64;

        inner.xchecksum = checksum(inner.xchecksum, &framed);
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.write_i32::<BigEndian>(inner.xchecksum)?;
        inner.file.sync_data()?;
        Ok(())
    }

    /// Repositions the record iterator to the first record.
    pub fn rewind(&self) {
        self.inner.lock().position = HEADER_LEN;
    }

    /// Returns the next record's data, or `None` at the end of the log.
    pub fn next(&self) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        Ok(inner
            .intern_next()?
            .map(|framed| framed[OF_DATA as usize..].to_vec()))
    }
}

impl LoggerInner {
    /// Reads the framed record at the cursor, verifying its checksum.
    /// Returns `None` on a truncated or corrupt frame.
    fn intern_next(&mut self) -> Result<Option<Vec<u8>>> {
        if self.position + OF_DATA >= self.file_size {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(self.position))?;
        let size = self.file.read_u32::<BigEndian>()? as u64;
        if self.position + OF_DATA + size > self.file_size {
            return Ok(None);
        }

        let mut framed = vec![0u8; (OF_DATA + size) as usize];
        self.file.seek(SeekFrom::Start(self.position))?;
        self.file.read_exact(&mut framed)?;

        let stored = BigEndian::read_i32(&framed[4..8]);
        if checksum(0, &framed[OF_DATA as usize..]) != stored {
            return Ok(None);
        }
        self.position += framed.len() as u64;
        Ok(Some(framed))
    }

    fn check_and_remove_tail(&mut self) -> Result<()> {
        self.position = HEADER_LEN;
        let mut check = 0i32;
        while let Some(framed) = self.intern_next()? {
            check = checksum(check, &framed);
        }
        if check != self.xchecksum {
            return Err(Error::BadLogFile);
        }
        // Everything past the last verified record is a partial write.
        self.file.set_len(self.position)?;
        self.file_size = self.position;
        self.position = HEADER_LEN;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_log_and_iterate() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        let logger = Logger::create(&base).unwrap();

        logger.log(b"first").unwrap();
        logger.log(b"second").unwrap();

        logger.rewind();
        assert_eq!(logger.next().unwrap().unwrap(), b"first");
        assert_eq!(logger.next().unwrap().unwrap(), b"second");
        assert!(logger.next().unwrap().is_none());

        // Restartable iteration.
        logger.rewind();
        assert_eq!(logger.next().unwrap().unwrap(), b"first");
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        {
            let logger = Logger::create(&base).unwrap();
            logger.log(b"alpha").unwrap();
            logger.log(b"beta").unwrap();
        }
        let logger = Logger::open(&base).unwrap();
        assert_eq!(logger.next().unwrap().unwrap(), b"alpha");
        assert_eq!(logger.next().unwrap().unwrap(), b"beta");
        assert!(logger.next().unwrap().is_none());
    }

    #[test]
    fn test_bad_tail_is_truncated() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        {
            let logger = Logger::create(&base).unwrap();
            logger.log(b"kept").unwrap();
        }
        // Simulate a crash mid-append: garbage after the last good record.
        let path = log_path(&base);
        let mut bytes = fs::read(&path).unwrap();
        let good_len = bytes.len();
        bytes.extend_from_slice(&[0x12, 0x34, 0x56]);
        fs::write(&path, bytes).unwrap();

        let logger = Logger::open(&base).unwrap();
        assert_eq!(logger.next().unwrap().unwrap(), b"kept");
        assert!(logger.next().unwrap().is_none());
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len as u64);
    }

    #[test]
    fn test_corrupt_header_checksum_rejected() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        {
            let logger = Logger::create(&base).unwrap();
            logger.log(b"data").unwrap();
        }
        let path = log_path(&base);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(Logger::open(&base), Err(Error::BadLogFile)));
    }

    #[test]
    fn test_open_rejects_short_file() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("test");
        fs::write(log_path(&base), [0u8; 2]).unwrap();
        assert!(matches!(Logger::open(&base), Err(Error::BadLogFile)));
    }
}
