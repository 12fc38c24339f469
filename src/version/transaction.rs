//! In-memory state of one running transaction.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::Error;
use crate::transaction::Xid;
use crate::version::IsolationLevel;

pub struct Transaction {
    xid: Xid,
    level: IsolationLevel,
    /// Xids that were active at begin. Empty under read-committed.
    snapshot: HashSet<Xid>,
    /// Once set, every further operation on this transaction fails with a
    /// copy of this error until it is explicitly aborted.
    err: Mutex<Option<Error>>,
    auto_aborted: AtomicBool,
}

impl Transaction {
    pub fn new(xid: Xid, level: IsolationLevel, snapshot: HashSet<Xid>) -> Self {
        Self {
            xid,
            level,
            snapshot,
            err: Mutex::new(None),
            auto_aborted: AtomicBool::new(false),
        }
    }

    pub fn xid(&self) -> Xid {
        self.xid
    }

    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    /// Whether `xid` was active when this transaction began. The super
    /// transaction is treated as committed since forever.
    pub fn in_snapshot(&self, xid: Xid) -> bool {
        !xid.is_super() && self.snapshot.contains(&xid)
    }

    pub fn set_err(&self, err: &Error) {
        let mut slot = self.err.lock();
        if slot.is_none() {
            *slot = Some(replicate(err));
        }
    }

    /// Returns a copy of the poison error, if any.
    pub fn err(&self) -> Option<Error> {
        self.err.lock().as_ref().map(replicate)
    }

    pub fn set_auto_aborted(&self) {
        self.auto_aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_auto_aborted(&self) -> bool {
        self.auto_aborted.load(Ordering::SeqCst)
    }
}

/// The error is stored once and reported possibly many times, so it is
/// duplicated by value for the variants that matter and by message for the
/// rest.
fn replicate(err: &Error) -> Error {
    match err {
        Error::Deadlock => Error::Deadlock,
        Error::ConcurrentUpdate => Error::ConcurrentUpdate,
        other => Error::Other(other.to_string()),
    }
}
