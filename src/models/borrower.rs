//! Borrower model

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::loan::LoanId;

/// Registered borrower.
///
/// `open_loans` is a projection of the loan ledger, maintained by the ledger only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub id: String,
    pub display_name: String,
    pub open_loans: BTreeSet<LoanId>,
}

impl Borrower {
    pub fn open_count(&self) -> usize {
        self.open_loans.len()
    }

    pub fn can_borrow(&self, limit: usize) -> bool {
        self.open_loans.len() < limit
    }
}

impl std::fmt::Display for Borrower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) - {} open loan(s)", self.display_name, self.id, self.open_loans.len())
    }
}

/// Create borrower request
#[derive(Debug, Clone, Deserialize)]
pub struct NewBorrower {
    pub id: String,
    pub display_name: String,
}

impl NewBorrower {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Update borrower request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBorrower {
    pub display_name: Option<String>,
}

/// Caller-selected ordering for borrower listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum BorrowerSort {
    #[default]
    Insertion,
    Id,
    Name,
    OpenLoans,
}
