//! Record storage on top of the page layer.
//!
//! A record lives inside a data page and is addressed by a [`Uid`]. The
//! [`DataManager`] hands out cached [`DataItem`] handles and drives the
//! write-ahead logging that makes mutations recoverable.

pub mod item;
pub mod manager;

use std::fmt;

pub use item::{DataItem, ItemWriteGuard};
pub use manager::{DataManager, ItemRef};

/// Stable address of a record: page number in the high 32 bits, in-page
/// offset in the low 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(pub u64);

impl Uid {
    pub fn new(pgno: u32, offset: u16) -> Self {
        Self(((pgno as u64) << 32) | offset as u64)
    }

    pub fn pgno(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn offset(self) -> u16 {
        self.0 as u16
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pgno(), self.offset())
    }
}
