pub mod cache;
pub mod data;
pub mod error;
pub mod recovery;
pub mod storage;
pub mod transaction;
pub mod version;
