//! Error types for the lending ledger

use std::time::Duration;

use thiserror::Error;

use crate::models::{item::ItemStatus, loan::LoanId};

/// Numeric outcome codes, stable across front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    StoreFailure = 3,
    NoSuchBorrower = 4,
    NoSuchItem = 5,
    ItemNotAvailable = 7,
    Duplicate = 8,
    MaxBorrowsReached = 11,
    ItemBorrowed = 13,
    NoSuchLoan = 20,
    BorrowerHasBorrowedItems = 21,
    AlreadyHeld = 22,
    ItemNotBorrowed = 23,
}

/// Which keyed collection a duplicate was detected in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Item,
    Borrower,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Item => write!(f, "item"),
            EntityKind::Borrower => write!(f, "borrower"),
        }
    }
}

/// Named outcomes of ledger operations.
///
/// Every variant is an expected business result the caller branches on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{kind} with id {id} already exists")]
    DuplicateKey { kind: EntityKind, id: String },

    #[error("Item {0} not found")]
    ItemNotFound(String),

    #[error("Borrower {0} not found")]
    BorrowerNotFound(String),

    #[error("Item {0} is on loan")]
    ItemOnLoan(String),

    #[error("Borrower {borrower} has {open} open loan(s)")]
    BorrowerHasOpenLoans { borrower: String, open: usize },

    #[error("Item {item} is not available ({status})")]
    ItemUnavailable { item: String, status: ItemStatus },

    #[error("Borrower {borrower} has reached the maximum number of loans ({limit})")]
    BorrowLimitReached { borrower: String, limit: usize },

    #[error("Borrower {borrower} already holds item {item} under loan {loan}")]
    AlreadyHeldByBorrower {
        item: String,
        borrower: String,
        loan: LoanId,
    },

    #[error("Item {0} is not on loan")]
    ItemNotOnLoan(String),

    #[error("No open loan of item {item} by borrower {borrower}")]
    NoMatchingOpenLoan { item: String, borrower: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::DuplicateKey { .. } => ErrorCode::Duplicate,
            LedgerError::ItemNotFound(_) => ErrorCode::NoSuchItem,
            LedgerError::BorrowerNotFound(_) => ErrorCode::NoSuchBorrower,
            LedgerError::ItemOnLoan(_) => ErrorCode::ItemBorrowed,
            LedgerError::BorrowerHasOpenLoans { .. } => ErrorCode::BorrowerHasBorrowedItems,
            LedgerError::ItemUnavailable { .. } => ErrorCode::ItemNotAvailable,
            LedgerError::BorrowLimitReached { .. } => ErrorCode::MaxBorrowsReached,
            LedgerError::AlreadyHeldByBorrower { .. } => ErrorCode::AlreadyHeld,
            LedgerError::ItemNotOnLoan(_) => ErrorCode::ItemNotBorrowed,
            LedgerError::NoMatchingOpenLoan { .. } => ErrorCode::NoSuchLoan,
            LedgerError::StoreUnavailable(_) => ErrorCode::StoreFailure,
        }
    }
}

/// Failures reported by a persistence store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        LedgerError::StoreUnavailable(e.to_string())
    }
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
