//! Crate-wide error types.

use thiserror::Error;

/// Errors surfaced by the storage engine.
///
/// File corruption variants (`BadTransactionFile`, `BadLogFile`) abort
/// startup; the remaining variants are recoverable at the granularity of a
/// single operation or a single transaction.
#[derive(Error, Debug)]
pub enum Error {
    #[error("file already exists: {0}")]
    FileExists(String),

    #[error("file does not exist: {0}")]
    FileNotExists(String),

    #[error("transaction file is corrupt")]
    BadTransactionFile,

    #[error("log file is corrupt")]
    BadLogFile,

    #[error("cache is full")]
    CacheFull,

    #[error("cache memory below the minimum of {0} pages")]
    MemTooSmall(usize),

    #[error("data exceeds the maximum record size")]
    DataTooLarge,

    #[error("database is busy")]
    DatabaseBusy,

    #[error("entry does not exist")]
    NullEntry,

    #[error("deadlock detected")]
    Deadlock,

    #[error("concurrent update conflict")]
    ConcurrentUpdate,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
