//! Log record types and their wire format.
//!
//! Record payloads (the `data` portion framed by the logger) look like:
//!
//! - insert: `[type=0][xid: u64][pgno: u32][offset: u16][raw]`
//! - update: `[type=1][xid: u64][uid: u64][old][new]` with equal halves
//!
//! All integers are big-endian.

use byteorder::{BigEndian, ByteOrder};

use crate::data::Uid;
use crate::error::{Error, Result};
use crate::transaction::Xid;

const TYPE_INSERT: u8 = 0;
const TYPE_UPDATE: u8 = 1;

const OF_XID: usize = 1;
const OF_INSERT_PGNO: usize = OF_XID + 8;
const OF_INSERT_OFFSET: usize = OF_INSERT_PGNO + 4;
const OF_INSERT_RAW: usize = OF_INSERT_OFFSET + 2;
const OF_UPDATE_UID: usize = OF_XID + 8;
const OF_UPDATE_RAW: usize = OF_UPDATE_UID + 8;

/// A decoded WAL record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Insert {
        xid: Xid,
        pgno: u32,
        offset: u16,
        raw: Vec<u8>,
    },
    Update {
        xid: Xid,
        uid: Uid,
        old: Vec<u8>,
        new: Vec<u8>,
    },
}

impl LogRecord {
    pub fn insert(xid: Xid, pgno: u32, offset: u16, raw: Vec<u8>) -> Self {
        Self::Insert {
            xid,
            pgno,
            offset,
            raw,
        }
    }

    pub fn update(xid: Xid, uid: Uid, old: Vec<u8>, new: Vec<u8>) -> Self {
        debug_assert_eq!(old.len(), new.len());
        Self::Update { xid, uid, old, new }
    }

    pub fn xid(&self) -> Xid {
        match self {
            Self::Insert { xid, .. } | Self::Update { xid, .. } => *xid,
        }
    }

    /// The page touched by this record.
    pub fn pgno(&self) -> u32 {
        match self {
            Self::Insert { pgno, .. } => *pgno,
            Self::Update { uid, .. } => uid.pgno(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Insert {
                xid,
                pgno,
                offset,
                raw,
            } => {
                let mut buf = vec![0u8; OF_INSERT_RAW + raw.len()];
                buf[0] = TYPE_INSERT;
                BigEndian::write_u64(&mut buf[OF_XID..OF_INSERT_PGNO], xid.0);
                BigEndian::write_u32(&mut buf[OF_INSERT_PGNO..OF_INSERT_OFFSET], *pgno);
                BigEndian::write_u16(&mut buf[OF_INSERT_OFFSET..OF_INSERT_RAW], *offset);
                buf[OF_INSERT_RAW..].copy_from_slice(raw);
                buf
            }
            Self::Update { xid, uid, old, new } => {
                let mut buf = vec![0u8; OF_UPDATE_RAW + old.len() + new.len()];
                buf[0] = TYPE_UPDATE;
                BigEndian::write_u64(&mut buf[OF_XID..OF_UPDATE_UID], xid.0);
                BigEndian::write_u64(&mut buf[OF_UPDATE_UID..OF_UPDATE_RAW], uid.raw());
                buf[OF_UPDATE_RAW..OF_UPDATE_RAW + old.len()].copy_from_slice(old);
                buf[OF_UPDATE_RAW + old.len()..].copy_from_slice(new);
                buf
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::BadLogFile);
        }
        match data[0] {
            TYPE_INSERT => {
                if data.len() < OF_INSERT_RAW {
                    return Err(Error::BadLogFile);
                }
                Ok(Self::Insert {
                    xid: Xid(BigEndian::read_u64(&data[OF_XID..OF_INSERT_PGNO])),
                    pgno: BigEndian::read_u32(&data[OF_INSERT_PGNO..OF_INSERT_OFFSET]),
                    offset: BigEndian::read_u16(&data[OF_INSERT_OFFSET..OF_INSERT_RAW]),
                    raw: data[OF_INSERT_RAW..].to_vec(),
                })
            }
            TYPE_UPDATE => {
                if data.len() < OF_UPDATE_RAW
                    || (data.len() - OF_UPDATE_RAW) % 2 != 0
                {
                    return Err(Error::BadLogFile);
                }
                let half = (data.len() - OF_UPDATE_RAW) / 2;
                Ok(Self::Update {
                    xid: Xid(BigEndian::read_u64(&data[OF_XID..OF_UPDATE_UID])),
                    uid: Uid(BigEndian::read_u64(&data[OF_UPDATE_UID..OF_UPDATE_RAW])),
                    old: data[OF_UPDATE_RAW..OF_UPDATE_RAW + half].to_vec(),
                    new: data[OF_UPDATE_RAW + half..].to_vec(),
                })
            }
            _ => Err(Error::BadLogFile),
        }
    }
}
