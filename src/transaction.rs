//! Durable transaction state management.
//!
//! Transaction state lives in a fixed-record file (`<path>.xid`): an 8-byte
//! counter header followed by one status byte per transaction id. This file
//! is the authoritative record consulted by crash recovery and by MVCC
//! visibility checks.

pub mod id;
pub mod manager;
pub mod state;

pub use id::{Xid, SUPER_XID};
pub use manager::TransactionManager;
pub use state::TransactionState;
