//! Lending ledger
//!
//! Tracks a catalog of lendable items, registered borrowers and the loans
//! between them, keeping the three in agreement at all times. An optional
//! external store receives best-effort write-through copies of every change
//! and can be reloaded and reconciled at startup.

pub mod bridge;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{LedgerError, LedgerResult, StoreError};
pub use ledger::{Ledger, MAX_LOANS};
pub use services::LendingService;
