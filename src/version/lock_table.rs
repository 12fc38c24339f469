//! Wait-for graph over transactions and the uids they delete.
//!
//! A transaction owns a uid while it holds the delete lock on it; every
//! other transaction wanting that uid queues up FIFO and blocks on a
//! [`WaitGate`]. Since a transaction waits for at most one uid at a time,
//! the wait-for graph is a functional graph and cycle detection is a single
//! chain walk from the transaction that just started waiting.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::data::Uid;
use crate::error::{Error, Result};
use crate::transaction::Xid;

/// What a blocked transaction parks on until the uid is granted to it.
pub struct WaitGate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl WaitGate {
    fn new() -> Self {
        Self {
            open: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Blocks until the contended uid has been granted to the waiter.
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }

    fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }
}

#[derive(Default)]
struct GraphState {
    /// Uids each transaction currently owns.
    owned: HashMap<Xid, Vec<Uid>>,
    holder: HashMap<Uid, Xid>,
    waiters: HashMap<Uid, VecDeque<Xid>>,
    gates: HashMap<Xid, Arc<WaitGate>>,
    /// The single uid a transaction is blocked on, if any.
    waits_on: HashMap<Xid, Uid>,
    stamps: HashMap<Xid, u64>,
    stamp: u64,
}

#[derive(Default)]
pub struct LockTable {
    state: Mutex<GraphState>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the delete lock on `uid` for `xid`.
    ///
    /// Returns `None` when the lock is granted immediately (including the
    /// re-entrant case), or a gate the caller must [`WaitGate::wait`] on.
    /// Fails with [`Error::Deadlock`] when waiting would close a cycle; the
    /// wait edge is rolled back before returning.
    pub fn add(&self, xid: Xid, uid: Uid) -> Result<Option<Arc<WaitGate>>> {
        let mut state = self.state.lock();

        if state.owned.get(&xid).is_some_and(|uids| uids.contains(&uid)) {
            return Ok(None);
        }
        if !state.holder.contains_key(&uid) {
            state.holder.insert(uid, xid);
            state.owned.entry(xid).or_default().push(uid);
            return Ok(None);
        }

        state.waits_on.insert(xid, uid);
        state.waiters.entry(uid).or_default().push_back(xid);
        if state.has_cycle(xid) {
            state.waits_on.remove(&xid);
            let mut drained = false;
            if let Some(queue) = state.waiters.get_mut(&uid) {
                queue.retain(|&waiter| waiter != xid);
                drained = queue.is_empty();
            }
            if drained {
                state.waiters.remove(&uid);
            }
            return Err(Error::Deadlock);
        }

        let gate = Arc::new(WaitGate::new());
        state.gates.insert(xid, Arc::clone(&gate));
        Ok(Some(gate))
    }

    /// Releases everything `xid` holds and promotes the next waiter of each
    /// released uid, in arrival order. Called exactly once per transaction
    /// end.
    pub fn remove(&self, xid: Xid) {
        let mut state = self.state.lock();

        if let Some(uids) = state.owned.remove(&xid) {
            for uid in uids {
                state.holder.remove(&uid);
                state.promote_next(uid);
            }
        }
        state.waits_on.remove(&xid);
        state.gates.remove(&xid);
        state.stamps.remove(&xid);
    }
}

impl GraphState {
    /// Walks the wait chain from `start` through `waits_on` and `holder`.
    /// Each call stamps the nodes it visits with a fresh pass number; seeing
    /// the current pass's stamp again means the chain loops.
    fn has_cycle(&mut self, start: Xid) -> bool {
        self.stamp += 1;
        let pass = self.stamp;
        let mut current = start;
        loop {
            if self.stamps.get(&current) == Some(&pass) {
                return true;
            }
            self.stamps.insert(current, pass);
            let Some(uid) = self.waits_on.get(&current) else {
                return false;
            };
            let Some(&next) = self.holder.get(uid) else {
                return false;
            };
            current = next;
        }
    }

    fn promote_next(&mut self, uid: Uid) {
        let (next, drained) = match self.waiters.get_mut(&uid) {
            Some(queue) => (queue.pop_front(), queue.is_empty()),
            None => return,
        };
        if drained {
            self.waiters.remove(&uid);
        }
        let Some(waiter) = next else {
            return;
        };

        self.holder.insert(uid, waiter);
        self.owned.entry(waiter).or_default().push(uid);
        self.waits_on.remove(&waiter);
        if let Some(gate) = self.gates.remove(&waiter) {
            gate.open();
        }
    }
}
