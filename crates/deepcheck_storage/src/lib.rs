#![forbid(unsafe_code)]

pub mod accounts;
pub mod credential;
pub mod history;
pub mod repo;
pub mod snapshot;

pub use accounts::{AccountError, AccountStore};
pub use history::HistoryLog;
pub use snapshot::{FileSnapshot, MemorySnapshot, SnapshotBackend, StorageError};
