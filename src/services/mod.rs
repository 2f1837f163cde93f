//! Business logic services

pub mod lending;

pub use lending::{LedgerStatus, LendingService, StorageMode};
