//! Transaction identifiers.

use std::fmt;

/// A unique identifier for a transaction, assigned monotonically from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Xid(pub u64);

/// The reserved "super transaction": always committed, never active, and
/// never recorded in the transaction file.
pub const SUPER_XID: Xid = Xid(0);

impl Xid {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_super(&self) -> bool {
        *self == SUPER_XID
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xid{}", self.0)
    }
}
