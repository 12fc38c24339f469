//! Visibility of entry versions to transactions.

use crate::error::Result;
use crate::transaction::{TransactionManager, SUPER_XID};
use crate::version::{Entry, IsolationLevel, Transaction};

/// Whether `t` may observe the version `e`.
pub fn is_visible(tm: &TransactionManager, t: &Transaction, e: &Entry) -> Result<bool> {
    match t.level() {
        IsolationLevel::ReadCommitted => read_committed(tm, t, e),
        IsolationLevel::RepeatableRead => repeatable_read(tm, t, e),
    }
}

fn read_committed(tm: &TransactionManager, t: &Transaction, e: &Entry) -> Result<bool> {
    let xid = t.xid();
    let xmin = e.xmin();
    let xmax = e.xmax();

    // Our own version, not deleted by anyone.
    if xmin == xid && xmax == SUPER_XID {
        return Ok(true);
    }
    if tm.is_committed(xmin)? {
        if xmax == SUPER_XID {
            return Ok(true);
        }
        // Deleted, but the deleter has not committed: the delete is not
        // observable yet.
        if xmax != xid && !tm.is_committed(xmax)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn repeatable_read(tm: &TransactionManager, t: &Transaction, e: &Entry) -> Result<bool> {
    let xid = t.xid();
    let xmin = e.xmin();
    let xmax = e.xmax();

    if xmin == xid && xmax == SUPER_XID {
        return Ok(true);
    }
    // The creator must have committed before we began.
    if tm.is_committed(xmin)? && xmin < xid && !t.in_snapshot(xmin) {
        if xmax == SUPER_XID {
            return Ok(true);
        }
        // A delete counts only if it committed before we began.
        if xmax != xid
            && (!tm.is_committed(xmax)? || xmax > xid || t.in_snapshot(xmax))
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Lost-update guard for repeatable read: true when some transaction `t`
/// cannot see has already committed a delete of this version. Deleting on
/// top of it would silently drop that committed delete.
pub fn is_version_skip(tm: &TransactionManager, t: &Transaction, e: &Entry) -> Result<bool> {
    if t.level() == IsolationLevel::ReadCommitted {
        return Ok(false);
    }
    let xmax = e.xmax();
    Ok(tm.is_committed(xmax)? && (xmax > t.xid() || t.in_snapshot(xmax)))
}
