//! Data models for the lending ledger

pub mod borrower;
pub mod item;
pub mod loan;
pub mod rows;

// Re-export commonly used types
pub use borrower::{Borrower, BorrowerSort, NewBorrower, UpdateBorrower};
pub use item::{Item, ItemSort, ItemStatus, NewItem, UpdateItem};
pub use loan::{LoanId, LoanRecord};
pub use rows::{BorrowerRow, ItemRow, LoanRow, StoreSnapshot};
