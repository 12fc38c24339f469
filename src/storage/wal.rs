//! Write-ahead logging.
//!
//! Every page mutation is logged before it is applied. The log file carries
//! a running file-level checksum so a partially written trailing record from
//! a crash can be detected and truncated at startup.

pub mod logger;
pub mod record;

pub use logger::Logger;
pub use record::LogRecord;
