//! Page-oriented storage layer.
//!
//! This module provides the persistent foundation of the engine:
//!
//! - **Page**: fixed-size (8 KiB) blocks, numbered from 1; page 1 is
//!   reserved for the clean-shutdown stamp
//! - **PageCache**: reference-counted cache of pages over a single data file
//! - **PageIndex**: in-memory free-space index used to pick insert targets
//! - **wal**: append-only write-ahead log with a file-level checksum

pub mod page;
pub mod page_cache;
pub mod page_index;
pub mod wal;

/// Size of a page in bytes.
pub const PAGE_SIZE: usize = 8192;

pub use page::Page;
pub use page_cache::{PageCache, PageRef};
pub use page_index::PageIndex;
pub use wal::logger::Logger;
pub use wal::record::LogRecord;
