//! Layout of ordinary data pages.
//!
//! A data page starts with a 2-byte free-space offset (FSO) followed by
//! packed variable-length records. The FSO points at the first unused byte;
//! inserting appends at the FSO and advances it.

use byteorder::{BigEndian, ByteOrder};

use crate::storage::{Page, PAGE_SIZE};

/// Offset of the first record byte; everything before it is the FSO header.
const OF_DATA: usize = 2;

/// Free space available in a freshly initialized page.
pub const MAX_FREE_SPACE: usize = PAGE_SIZE - OF_DATA;

/// Returns the initial bytes of an empty data page.
pub fn init() -> Box<[u8; PAGE_SIZE]> {
    let mut raw = Box::new([0u8; PAGE_SIZE]);
    set_fso(&mut raw[..], OF_DATA as u16);
    raw
}

fn set_fso(raw: &mut [u8], fso: u16) {
    BigEndian::write_u16(&mut raw[0..OF_DATA], fso);
}

pub fn fso_of_raw(raw: &[u8]) -> u16 {
    BigEndian::read_u16(&raw[0..OF_DATA])
}

pub fn fso(page: &Page) -> u16 {
    fso_of_raw(&page.read_data()[..])
}

pub fn free_space(page: &Page) -> usize {
    PAGE_SIZE - fso(page) as usize
}

/// Appends `raw` at the page's free-space offset and advances the offset.
/// Returns the offset the record was written at.
pub fn insert(page: &Page, raw: &[u8]) -> u16 {
    page.set_dirty();
    let mut data = page.write_data();
    let offset = fso_of_raw(&data[..]);
    data[offset as usize..offset as usize + raw.len()].copy_from_slice(raw);
    set_fso(&mut data[..], offset + raw.len() as u16);
    offset
}

/// Recovery-only insert replay: writes `raw` at the logged offset and
/// advances the free-space offset only if the record extends past it, so a
/// replay at an already-advanced offset never regresses the pointer.
pub fn recover_insert(page: &Page, raw: &[u8], offset: u16) {
    page.set_dirty();
    let mut data = page.write_data();
    data[offset as usize..offset as usize + raw.len()].copy_from_slice(raw);
    let end = offset + raw.len() as u16;
    if fso_of_raw(&data[..]) < end {
        set_fso(&mut data[..], end);
    }
}

/// Recovery-only update replay: writes `raw` at the logged offset without
/// touching the free-space offset.
pub fn recover_update(page: &Page, raw: &[u8], offset: u16) {
    page.set_dirty();
    let mut data = page.write_data();
    data[offset as usize..offset as usize + raw.len()].copy_from_slice(raw);
}
