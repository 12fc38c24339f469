//! A versioned record: `[xmin: u64 BE][xmax: u64 BE][payload]`.
//!
//! `xmin` is the creating transaction, `xmax` the deleting one; `xmax == 0`
//! means the version is live. Entries never change in place except for the
//! single `xmax` write that marks deletion.

use byteorder::{BigEndian, ByteOrder};

use crate::data::{item, ItemRef, Uid};
use crate::error::Result;
use crate::transaction::Xid;

const OF_XMIN: usize = 0;
const OF_XMAX: usize = 8;
const OF_DATA: usize = 16;

/// Builds the on-disk form of a fresh entry created by `xid`.
pub fn wrap(xid: Xid, data: &[u8]) -> Vec<u8> {
    let mut raw = vec![0u8; OF_DATA + data.len()];
    BigEndian::write_u64(&mut raw[OF_XMIN..OF_XMAX], xid.0);
    raw[OF_DATA..].copy_from_slice(data);
    raw
}

/// A cached entry, pinning its data item (and through it, its page).
pub struct Entry {
    uid: Uid,
    item: ItemRef,
}

impl Entry {
    pub fn new(uid: Uid, item: ItemRef) -> Self {
        Self { uid, item }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn xmin(&self) -> Xid {
        Xid(BigEndian::read_u64(&self.item.data()[OF_XMIN..OF_XMAX]))
    }

    pub fn xmax(&self) -> Xid {
        Xid(BigEndian::read_u64(&self.item.data()[OF_XMAX..OF_DATA]))
    }

    /// Copies out the user payload.
    pub fn data(&self) -> Vec<u8> {
        self.item.data()[OF_DATA..].to_vec()
    }

    /// Marks the version deleted by `xid`. Goes through the data item's
    /// write protocol, so the change is WAL-logged before it can reach disk.
    pub fn set_xmax(&self, xid: Xid) -> Result<()> {
        let mut guard = self.item.before();
        let base = item::OF_DATA;
        BigEndian::write_u64(&mut guard.raw_mut()[base + OF_XMAX..base + OF_DATA], xid.0);
        guard.commit(xid)
    }
}
