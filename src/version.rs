//! Multi-version concurrency control.
//!
//! Every stored value is an [`Entry`] carrying the xids that created and
//! deleted it. The [`VersionManager`] decides per transaction which version
//! is visible and serializes conflicting deletes through the [`LockTable`].

pub mod entry;
pub mod lock_table;
pub mod manager;
pub mod transaction;
pub mod visibility;

pub use entry::Entry;
pub use lock_table::LockTable;
pub use manager::VersionManager;
pub use transaction::Transaction;

/// Supported isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Reads see every committed write, however recent.
    ReadCommitted,
    /// Reads see the state as of the transaction's begin.
    RepeatableRead,
}
