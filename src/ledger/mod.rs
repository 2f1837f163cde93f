//! In-memory lending ledger
//!
//! Holds the three entity collections and enforces the lending invariants:
//! an item is `Lent` iff exactly one open loan references it, a borrower's
//! open set mirrors its open loans and never exceeds the loan limit, loan ids
//! are never reused, and nothing with an open loan can be deleted.
//!
//! Every mutating operation validates first and only then writes, so a
//! failed call leaves the ledger untouched.

pub mod reconcile;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    error::{EntityKind, LedgerError, LedgerResult},
    models::{
        borrower::{Borrower, BorrowerSort, NewBorrower, UpdateBorrower},
        item::{Item, ItemSort, ItemStatus, NewItem, UpdateItem},
        loan::{LoanId, LoanRecord},
    },
};

pub use reconcile::{ReconcileReport, ReconcileWarning};

/// Default number of loans a borrower may hold at once
pub const MAX_LOANS: usize = 3;

/// Counts for a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub items: usize,
    pub borrowers: usize,
    pub loans: usize,
    pub open_loans: usize,
}

/// A broken invariant found by [`Ledger::check_invariants`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Item status disagrees with the number of open loans referencing it
    ItemStatus {
        item: String,
        status: ItemStatus,
        open_loans: usize,
    },
    /// Borrower's open set is not the set of its open loans
    BorrowerOpenSet { borrower: String },
    /// Borrower holds more open loans than the limit
    BorrowerOverLimit { borrower: String, open: usize },
    /// A loan id at or above the next sequence value
    SequenceBehind { loan: LoanId, next_seq: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    items: IndexMap<String, Item>,
    borrowers: IndexMap<String, Borrower>,
    loans: IndexMap<LoanId, LoanRecord>,
    /// Open loans loaded without their item or borrower. Kept for history,
    /// never counted as open.
    orphaned: IndexMap<LoanId, LoanRecord>,
    next_seq: u64,
    max_loans: usize,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::with_max_loans(MAX_LOANS)
    }

    pub fn with_max_loans(max_loans: usize) -> Self {
        Self {
            items: IndexMap::new(),
            borrowers: IndexMap::new(),
            loans: IndexMap::new(),
            orphaned: IndexMap::new(),
            next_seq: 1,
            max_loans,
        }
    }

    pub fn max_loans(&self) -> usize {
        self.max_loans
    }

    /// Id the next successful borrow will receive
    pub fn next_loan_id(&self) -> LoanId {
        LoanId::from_seq(self.next_seq)
    }

    // ---------------------------------------------------------------------
    // Items
    // ---------------------------------------------------------------------

    pub fn add_item(&mut self, item: NewItem) -> LedgerResult<Item> {
        if self.items.contains_key(&item.id) {
            return Err(LedgerError::DuplicateKey {
                kind: EntityKind::Item,
                id: item.id,
            });
        }

        let item = Item {
            id: item.id,
            title: item.title,
            creator: item.creator,
            status: ItemStatus::Available,
        };
        self.items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    pub fn update_item(&mut self, id: &str, fields: UpdateItem) -> LedgerResult<Item> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| LedgerError::ItemNotFound(id.to_string()))?;

        if let Some(title) = fields.title {
            item.title = title;
        }
        if let Some(creator) = fields.creator {
            item.creator = creator;
        }
        Ok(item.clone())
    }

    pub fn remove_item(&mut self, id: &str) -> LedgerResult<Item> {
        let item = self.get_item_ref(id)?;
        if item.status == ItemStatus::Lent {
            return Err(LedgerError::ItemOnLoan(id.to_string()));
        }
        self.items
            .shift_remove(id)
            .ok_or_else(|| LedgerError::ItemNotFound(id.to_string()))
    }

    pub fn get_item(&self, id: &str) -> LedgerResult<Item> {
        self.get_item_ref(id).cloned()
    }

    pub fn list_items(&self, sort: ItemSort) -> Vec<Item> {
        let mut items: Vec<Item> = self.items.values().cloned().collect();
        match sort {
            ItemSort::Insertion => {}
            ItemSort::Id => items.sort_by(|a, b| a.id.cmp(&b.id)),
            ItemSort::Title => items.sort_by(|a, b| a.title.cmp(&b.title)),
            ItemSort::Creator => items.sort_by(|a, b| a.creator.cmp(&b.creator)),
        }
        items
    }

    fn get_item_ref(&self, id: &str) -> LedgerResult<&Item> {
        self.items
            .get(id)
            .ok_or_else(|| LedgerError::ItemNotFound(id.to_string()))
    }

    // ---------------------------------------------------------------------
    // Borrowers
    // ---------------------------------------------------------------------

    pub fn add_borrower(&mut self, borrower: NewBorrower) -> LedgerResult<Borrower> {
        if self.borrowers.contains_key(&borrower.id) {
            return Err(LedgerError::DuplicateKey {
                kind: EntityKind::Borrower,
                id: borrower.id,
            });
        }

        let borrower = Borrower {
            id: borrower.id,
            display_name: borrower.display_name,
            open_loans: BTreeSet::new(),
        };
        self.borrowers.insert(borrower.id.clone(), borrower.clone());
        Ok(borrower)
    }

    pub fn update_borrower(&mut self, id: &str, fields: UpdateBorrower) -> LedgerResult<Borrower> {
        let borrower = self
            .borrowers
            .get_mut(id)
            .ok_or_else(|| LedgerError::BorrowerNotFound(id.to_string()))?;

        if let Some(name) = fields.display_name {
            borrower.display_name = name;
        }
        Ok(borrower.clone())
    }

    pub fn remove_borrower(&mut self, id: &str) -> LedgerResult<Borrower> {
        let borrower = self.get_borrower_ref(id)?;
        if !borrower.open_loans.is_empty() {
            return Err(LedgerError::BorrowerHasOpenLoans {
                borrower: id.to_string(),
                open: borrower.open_loans.len(),
            });
        }
        self.borrowers
            .shift_remove(id)
            .ok_or_else(|| LedgerError::BorrowerNotFound(id.to_string()))
    }

    pub fn get_borrower(&self, id: &str) -> LedgerResult<Borrower> {
        self.get_borrower_ref(id).cloned()
    }

    pub fn list_borrowers(&self, sort: BorrowerSort) -> Vec<Borrower> {
        let mut borrowers: Vec<Borrower> = self.borrowers.values().cloned().collect();
        match sort {
            BorrowerSort::Insertion => {}
            BorrowerSort::Id => borrowers.sort_by(|a, b| a.id.cmp(&b.id)),
            BorrowerSort::Name => borrowers.sort_by(|a, b| a.display_name.cmp(&b.display_name)),
            BorrowerSort::OpenLoans => {
                borrowers.sort_by(|a, b| b.open_loans.len().cmp(&a.open_loans.len()))
            }
        }
        borrowers
    }

    fn get_borrower_ref(&self, id: &str) -> LedgerResult<&Borrower> {
        self.borrowers
            .get(id)
            .ok_or_else(|| LedgerError::BorrowerNotFound(id.to_string()))
    }

    // ---------------------------------------------------------------------
    // Lending
    // ---------------------------------------------------------------------

    /// Lend an item to a borrower, stamping the loan with the current time
    pub fn borrow(&mut self, item_id: &str, borrower_id: &str) -> LedgerResult<LoanRecord> {
        self.borrow_at(item_id, borrower_id, Utc::now())
    }

    pub fn borrow_at(
        &mut self,
        item_id: &str,
        borrower_id: &str,
        at: DateTime<Utc>,
    ) -> LedgerResult<LoanRecord> {
        let item = self.get_item_ref(item_id)?;
        let borrower = self.get_borrower_ref(borrower_id)?;

        if item.status != ItemStatus::Available {
            return Err(LedgerError::ItemUnavailable {
                item: item_id.to_string(),
                status: item.status,
            });
        }
        if !borrower.can_borrow(self.max_loans) {
            return Err(LedgerError::BorrowLimitReached {
                borrower: borrower_id.to_string(),
                limit: self.max_loans,
            });
        }
        if let Some(held) = self.find_open_loan(item_id, borrower_id) {
            return Err(LedgerError::AlreadyHeldByBorrower {
                item: item_id.to_string(),
                borrower: borrower_id.to_string(),
                loan: held.id.clone(),
            });
        }

        let id = LoanId::from_seq(self.next_seq);
        self.next_seq += 1;
        let loan = LoanRecord::open(id.clone(), item_id, borrower_id, at);

        self.loans.insert(id.clone(), loan.clone());
        if let Some(item) = self.items.get_mut(item_id) {
            item.status = ItemStatus::Lent;
        }
        if let Some(borrower) = self.borrowers.get_mut(borrower_id) {
            borrower.open_loans.insert(id);
        }

        Ok(loan)
    }

    /// Close the open loan of `item_id` held by `borrower_id`
    pub fn return_item(&mut self, item_id: &str, borrower_id: &str) -> LedgerResult<LoanRecord> {
        self.return_item_at(item_id, borrower_id, Utc::now())
    }

    pub fn return_item_at(
        &mut self,
        item_id: &str,
        borrower_id: &str,
        at: DateTime<Utc>,
    ) -> LedgerResult<LoanRecord> {
        let item = self.get_item_ref(item_id)?;
        self.get_borrower_ref(borrower_id)?;

        if item.status == ItemStatus::Available {
            return Err(LedgerError::ItemNotOnLoan(item_id.to_string()));
        }
        let loan_id = self
            .find_open_loan(item_id, borrower_id)
            .map(|loan| loan.id.clone())
            .ok_or_else(|| LedgerError::NoMatchingOpenLoan {
                item: item_id.to_string(),
                borrower: borrower_id.to_string(),
            })?;

        let closed = match self.loans.get_mut(&loan_id) {
            Some(loan) => {
                loan.close(at);
                loan.clone()
            }
            None => {
                return Err(LedgerError::NoMatchingOpenLoan {
                    item: item_id.to_string(),
                    borrower: borrower_id.to_string(),
                })
            }
        };

        if let Some(borrower) = self.borrowers.get_mut(borrower_id) {
            borrower.open_loans.remove(&loan_id);
        }
        let status = self.derived_status(item_id);
        if let Some(item) = self.items.get_mut(item_id) {
            item.status = status;
        }

        Ok(closed)
    }

    // ---------------------------------------------------------------------
    // Loan queries
    // ---------------------------------------------------------------------

    /// All loan records, open and closed, in creation order
    pub fn list_loans(&self) -> Vec<LoanRecord> {
        self.loans.values().cloned().collect()
    }

    pub fn get_loan(&self, id: &LoanId) -> Option<LoanRecord> {
        self.loans.get(id).or_else(|| self.orphaned.get(id)).cloned()
    }

    /// Open loans that reconciliation could not attach to an item or borrower
    pub fn orphaned_loans(&self) -> Vec<LoanRecord> {
        self.orphaned.values().cloned().collect()
    }

    pub fn loans_for_borrower(&self, borrower_id: &str, open_only: bool) -> LedgerResult<Vec<LoanRecord>> {
        self.get_borrower_ref(borrower_id)?;
        Ok(self
            .loans
            .values()
            .filter(|loan| loan.borrower_id == borrower_id && (loan.open || !open_only))
            .cloned()
            .collect())
    }

    pub fn open_loan_for_item(&self, item_id: &str) -> LedgerResult<Option<LoanRecord>> {
        self.get_item_ref(item_id)?;
        Ok(self
            .loans
            .values()
            .find(|loan| loan.open && loan.item_id == item_id)
            .cloned())
    }

    /// Count active loans
    pub fn count_active(&self) -> usize {
        self.loans.values().filter(|loan| loan.open).count()
    }

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            items: self.items.len(),
            borrowers: self.borrowers.len(),
            loans: self.loans.len(),
            open_loans: self.count_active(),
        }
    }

    fn find_open_loan(&self, item_id: &str, borrower_id: &str) -> Option<&LoanRecord> {
        self.borrowers
            .get(borrower_id)?
            .open_loans
            .iter()
            .filter_map(|id| self.loans.get(id))
            .find(|loan| loan.matches(item_id, borrower_id))
    }

    fn open_loans_of_item(&self, item_id: &str) -> usize {
        self.loans
            .values()
            .filter(|loan| loan.open && loan.item_id == item_id)
            .count()
    }

    fn derived_status(&self, item_id: &str) -> ItemStatus {
        if self.open_loans_of_item(item_id) > 0 {
            ItemStatus::Lent
        } else {
            ItemStatus::Available
        }
    }

    /// Check invariants across all three collections
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        for item in self.items.values() {
            let open = self.open_loans_of_item(&item.id);
            let consistent = match item.status {
                ItemStatus::Lent => open == 1,
                ItemStatus::Available => open == 0,
            };
            if !consistent {
                violations.push(InvariantViolation::ItemStatus {
                    item: item.id.clone(),
                    status: item.status,
                    open_loans: open,
                });
            }
        }

        for borrower in self.borrowers.values() {
            let expected: BTreeSet<LoanId> = self
                .loans
                .values()
                .filter(|loan| loan.open && loan.borrower_id == borrower.id)
                .map(|loan| loan.id.clone())
                .collect();
            if expected != borrower.open_loans {
                violations.push(InvariantViolation::BorrowerOpenSet {
                    borrower: borrower.id.clone(),
                });
            }
            if borrower.open_loans.len() > self.max_loans {
                violations.push(InvariantViolation::BorrowerOverLimit {
                    borrower: borrower.id.clone(),
                    open: borrower.open_loans.len(),
                });
            }
        }

        for id in self.loans.keys().chain(self.orphaned.keys()) {
            if id.seq() >= self.next_seq {
                violations.push(InvariantViolation::SequenceBehind {
                    loan: id.clone(),
                    next_seq: self.next_seq,
                });
            }
        }

        violations
    }
}
