//! Crash recovery over the write-ahead log.
//!
//! Three passes over the log: find the highest page any record touches and
//! truncate the data file there, REDO every record of a finished
//! transaction in log order, then UNDO the records of each still-active
//! transaction in reverse order and mark that transaction aborted.
//!
//! Replays are idempotent, so recovery interrupted by another crash can
//! simply run again.

use std::collections::HashMap;

use log::info;

use crate::data::item;
use crate::error::Result;
use crate::storage::page::data_page;
use crate::storage::page_cache::PageCache;
use crate::storage::wal::{LogRecord, Logger};
use crate::transaction::{TransactionManager, Xid};

pub fn recover(
    tm: &TransactionManager,
    logger: &Logger,
    page_cache: &PageCache,
) -> Result<()> {
    info!("recovery started");

    let mut max_pgno = 1;
    logger.rewind();
    while let Some(data) = logger.next()? {
        max_pgno = max_pgno.max(LogRecord::decode(&data)?.pgno());
    }
    // Pages past the last logged one can only hold garbage from a torn
    // allocation.
    page_cache.truncate_to(max_pgno)?;
    info!("data file truncated to {} pages", max_pgno);

    redo(tm, logger, page_cache)?;
    undo(tm, logger, page_cache)?;

    info!("recovery finished");
    Ok(())
}

/// Replays, in log order, every record of a transaction that is no longer
/// active. Aborted transactions are replayed too; their UNDO records were
/// logged as compensating updates, so the net effect is correct.
fn redo(tm: &TransactionManager, logger: &Logger, page_cache: &PageCache) -> Result<()> {
    logger.rewind();
    while let Some(data) = logger.next()? {
        let record = LogRecord::decode(&data)?;
        if tm.is_active(record.xid())? {
            continue;
        }
        match record {
            LogRecord::Insert {
                pgno, offset, raw, ..
            } => {
                let page = page_cache.get_page(pgno)?;
                data_page::recover_insert(&page, &raw, offset);
            }
            LogRecord::Update { uid, new, .. } => {
                let page = page_cache.get_page(uid.pgno())?;
                data_page::recover_update(&page, &new, uid.offset());
            }
        }
    }
    Ok(())
}

/// Rolls back every transaction the status file still shows as active, then
/// marks it aborted.
fn undo(tm: &TransactionManager, logger: &Logger, page_cache: &PageCache) -> Result<()> {
    let mut per_xid: HashMap<Xid, Vec<LogRecord>> = HashMap::new();
    logger.rewind();
    while let Some(data) = logger.next()? {
        let record = LogRecord::decode(&data)?;
        if tm.is_active(record.xid())? {
            per_xid.entry(record.xid()).or_default().push(record);
        }
    }

    for (xid, records) in per_xid {
        info!("undoing {} records of {}", records.len(), xid);
        for record in records.iter().rev() {
            match record {
                LogRecord::Insert {
                    pgno, offset, raw, ..
                } => {
                    // An undone insert leaves its slot in place but
                    // invalidated, so uids stay stable.
                    let page = page_cache.get_page(*pgno)?;
                    let mut raw = raw.clone();
                    item::set_raw_invalid(&mut raw);
                    data_page::recover_insert(&page, &raw, *offset);
                }
                LogRecord::Update { uid, old, .. } => {
                    let page = page_cache.get_page(uid.pgno())?;
                    data_page::recover_update(&page, old, uid.offset());
                }
            }
        }
        tm.abort(xid)?;
    }
    Ok(())
}
