//! Clean-shutdown detection on the reserved first page.
//!
//! On open, a random 8-byte stamp is written at bytes [100,108). On clean
//! close, the stamp is copied to [108,116). If the two ranges differ at the
//! next open, the previous shutdown was unclean and recovery must run.

use rand::Rng;

use crate::storage::{Page, PAGE_SIZE};

const OF_STAMP: usize = 100;
const STAMP_LEN: usize = 8;

/// Returns the initial bytes of the first page, stamped as open.
pub fn init() -> Box<[u8; PAGE_SIZE]> {
    let mut raw = Box::new([0u8; PAGE_SIZE]);
    write_stamp(&mut raw[..]);
    raw
}

fn write_stamp(raw: &mut [u8]) {
    rand::thread_rng().fill(&mut raw[OF_STAMP..OF_STAMP + STAMP_LEN]);
}

/// Writes a fresh open stamp, invalidating the previous close stamp.
pub fn set_open(page: &Page) {
    page.set_dirty();
    write_stamp(&mut page.write_data()[..]);
}

/// Copies the open stamp into the close slot, marking a clean shutdown.
pub fn set_closed(page: &Page) {
    page.set_dirty();
    let mut data = page.write_data();
    let (head, tail) = data.split_at_mut(OF_STAMP + STAMP_LEN);
    tail[..STAMP_LEN].copy_from_slice(&head[OF_STAMP..OF_STAMP + STAMP_LEN]);
}

/// True when the previous shutdown was clean.
pub fn is_clean(page: &Page) -> bool {
    let data = page.read_data();
    data[OF_STAMP..OF_STAMP + STAMP_LEN]
        == data[OF_STAMP + STAMP_LEN..OF_STAMP + 2 * STAMP_LEN]
}
