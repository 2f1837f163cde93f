//! Rebuild a ledger from raw store rows
//!
//! Derived state (item status, borrower open sets, the loan sequence) is
//! recomputed from the loan rows alone. A loan counts as open when it has no
//! return time. Inconsistencies in the input are
//! reported as warnings; they never abort the load.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use serde::Serialize;

use super::Ledger;
use crate::models::{
    borrower::Borrower,
    item::{Item, ItemStatus},
    loan::{LoanId, LoanRecord},
    rows::StoreSnapshot,
};

/// Which side of a loan points at a missing entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissingSide {
    Item,
    Borrower,
}

/// Consistency problems found while reconciling
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReconcileWarning {
    /// Stored status disagreed with the open-loan set; the derived one was kept
    StatusMismatch {
        item: String,
        stored: ItemStatus,
        derived: ItemStatus,
    },
    /// Stored status column could not be read
    UnreadableStatus { item: String, value: String },
    /// An open loan references an item or borrower that was not loaded
    OrphanLoan { loan: LoanId, missing: MissingSide },
    /// Stored `open` flag disagrees with the return time; the return time wins
    OpenFlagMismatch {
        loan: LoanId,
        stored_open: bool,
        returned: bool,
    },
    /// More than one open loan references the same item
    DuplicateOpenLoan { item: String, loans: Vec<LoanId> },
    /// Borrower holds more open loans than the configured limit
    LimitExceeded { borrower: String, open: usize, limit: usize },
}

impl std::fmt::Display for ReconcileWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileWarning::StatusMismatch { item, stored, derived } => write!(
                f,
                "item {} stored as {} but loans say {}",
                item, stored, derived
            ),
            ReconcileWarning::UnreadableStatus { item, value } => {
                write!(f, "item {} has unreadable status '{}'", item, value)
            }
            ReconcileWarning::OrphanLoan { loan, missing } => {
                write!(f, "open loan {} references a missing {:?}", loan, missing)
            }
            ReconcileWarning::OpenFlagMismatch { loan, stored_open, returned } => write!(
                f,
                "loan {} stored with open={} but returned={}",
                loan, stored_open, returned
            ),
            ReconcileWarning::DuplicateOpenLoan { item, loans } => {
                let ids: Vec<&str> = loans.iter().map(LoanId::as_str).collect();
                write!(f, "item {} has {} open loans: {}", item, loans.len(), ids.join(", "))
            }
            ReconcileWarning::LimitExceeded { borrower, open, limit } => write!(
                f,
                "borrower {} holds {} open loans (limit {})",
                borrower, open, limit
            ),
        }
    }
}

/// Outcome of a reconciliation: what was loaded and what looked wrong
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub items: usize,
    pub borrowers: usize,
    pub loans: usize,
    pub open_loans: usize,
    /// Open loans set aside because their item or borrower is missing
    pub orphaned_loans: usize,
    pub next_loan_id: String,
    pub warnings: Vec<ReconcileWarning>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl Ledger {
    /// Build a ledger from a bulk load.
    ///
    /// Pure function of its input: the same snapshot always yields the same
    /// ledger and report.
    pub fn reconcile(snapshot: &StoreSnapshot, max_loans: usize) -> (Ledger, ReconcileReport) {
        let mut warnings = Vec::new();

        // Items as stored
        let mut items: IndexMap<String, Item> = IndexMap::with_capacity(snapshot.items.len());
        for row in &snapshot.items {
            let status = match row.status.parse::<ItemStatus>() {
                Ok(status) => status,
                Err(_) => {
                    warnings.push(ReconcileWarning::UnreadableStatus {
                        item: row.id.clone(),
                        value: row.status.clone(),
                    });
                    ItemStatus::Available
                }
            };
            items.insert(
                row.id.clone(),
                Item {
                    id: row.id.clone(),
                    title: row.title.clone(),
                    creator: row.creator.clone(),
                    status,
                },
            );
        }

        // Borrowers start with nothing open
        let mut borrowers: IndexMap<String, Borrower> =
            IndexMap::with_capacity(snapshot.borrowers.len());
        for row in &snapshot.borrowers {
            borrowers.insert(
                row.id.clone(),
                Borrower {
                    id: row.id.clone(),
                    display_name: row.name.clone(),
                    open_loans: BTreeSet::new(),
                },
            );
        }

        // Loans: history as given, open ones feed the borrower sets. An open
        // loan whose item or borrower is missing is kept aside as an orphan
        // and feeds nothing.
        let mut loans: IndexMap<LoanId, LoanRecord> = IndexMap::with_capacity(snapshot.loans.len());
        let mut orphaned: IndexMap<LoanId, LoanRecord> = IndexMap::new();
        let mut open_by_item: BTreeMap<String, Vec<LoanId>> = BTreeMap::new();
        let mut max_seq: u64 = 0;
        for row in &snapshot.loans {
            let id = LoanId::parse(&row.id);
            max_seq = max_seq.max(id.seq());

            // A loan is open exactly when it has no return time
            let open = row.returned_at.is_none();
            if row.open != open {
                warnings.push(ReconcileWarning::OpenFlagMismatch {
                    loan: id.clone(),
                    stored_open: row.open,
                    returned: !open,
                });
            }

            let record = LoanRecord {
                id: id.clone(),
                item_id: row.item_id.clone(),
                borrower_id: row.borrower_id.clone(),
                borrowed_at: row.borrowed_at,
                returned_at: row.returned_at,
                open,
            };

            if !open {
                loans.insert(id, record);
                continue;
            }

            let item_missing = !items.contains_key(&row.item_id);
            let borrower_missing = !borrowers.contains_key(&row.borrower_id);
            if item_missing {
                warnings.push(ReconcileWarning::OrphanLoan {
                    loan: id.clone(),
                    missing: MissingSide::Item,
                });
            }
            if borrower_missing {
                warnings.push(ReconcileWarning::OrphanLoan {
                    loan: id.clone(),
                    missing: MissingSide::Borrower,
                });
            }
            if item_missing || borrower_missing {
                orphaned.insert(id, record);
                continue;
            }

            if let Some(borrower) = borrowers.get_mut(&row.borrower_id) {
                borrower.open_loans.insert(id.clone());
            }
            open_by_item
                .entry(row.item_id.clone())
                .or_default()
                .push(id.clone());
            loans.insert(id, record);
        }

        // Status follows the loans
        for item in items.values_mut() {
            let derived = match open_by_item.get(&item.id) {
                Some(open) if !open.is_empty() => ItemStatus::Lent,
                _ => ItemStatus::Available,
            };
            if let Some(open) = open_by_item.get_mut(&item.id) {
                if open.len() > 1 {
                    open.sort();
                    warnings.push(ReconcileWarning::DuplicateOpenLoan {
                        item: item.id.clone(),
                        loans: open.clone(),
                    });
                }
            }
            if item.status != derived {
                warnings.push(ReconcileWarning::StatusMismatch {
                    item: item.id.clone(),
                    stored: item.status,
                    derived,
                });
            }
            item.status = derived;
        }

        for borrower in borrowers.values() {
            if borrower.open_loans.len() > max_loans {
                warnings.push(ReconcileWarning::LimitExceeded {
                    borrower: borrower.id.clone(),
                    open: borrower.open_loans.len(),
                    limit: max_loans,
                });
            }
        }

        let ledger = Ledger {
            items,
            borrowers,
            loans,
            orphaned,
            next_seq: max_seq + 1,
            max_loans,
        };

        let summary = ledger.summary();
        let report = ReconcileReport {
            items: summary.items,
            borrowers: summary.borrowers,
            loans: summary.loans,
            open_loans: summary.open_loans,
            orphaned_loans: ledger.orphaned.len(),
            next_loan_id: ledger.next_loan_id().to_string(),
            warnings,
        };

        (ledger, report)
    }

    /// Replace this ledger's contents with a reconciled snapshot
    pub fn reload(&mut self, snapshot: &StoreSnapshot) -> ReconcileReport {
        let (ledger, report) = Ledger::reconcile(snapshot, self.max_loans);
        *self = ledger;
        report
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::{
        borrower::NewBorrower,
        rows::{BorrowerRow, ItemRow, LoanRow},
    };

    fn item_row(id: &str, status: &str) -> ItemRow {
        ItemRow {
            id: id.into(),
            title: format!("Title {}", id),
            creator: "Author".into(),
            status: status.into(),
        }
    }

    fn borrower_row(id: &str) -> BorrowerRow {
        BorrowerRow {
            id: id.into(),
            name: format!("Borrower {}", id),
        }
    }

    fn loan_row(id: &str, item: &str, borrower: &str, open: bool) -> LoanRow {
        let borrowed_at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        LoanRow {
            id: id.into(),
            item_id: item.into(),
            borrower_id: borrower.into(),
            borrowed_at,
            returned_at: if open { None } else { Some(borrowed_at) },
            open,
        }
    }

    fn sample() -> StoreSnapshot {
        StoreSnapshot {
            items: vec![
                item_row("I1", "LENT"),
                item_row("I2", "AVAILABLE"),
                item_row("I3", "AVAILABLE"),
            ],
            borrowers: vec![borrower_row("B1"), borrower_row("B2")],
            loans: vec![
                loan_row("T001", "I2", "B1", false),
                loan_row("T002", "I1", "B1", true),
                loan_row("T007", "I3", "B2", false),
            ],
        }
    }

    #[test]
    fn test_reconcile_clean_snapshot() {
        let (ledger, report) = Ledger::reconcile(&sample(), 3);

        assert!(report.is_clean(), "{:?}", report.warnings);
        assert_eq!(report.loans, 3);
        assert_eq!(report.open_loans, 1);
        assert_eq!(report.next_loan_id, "T008");
        assert_eq!(ledger.get_item("I1").unwrap().status, ItemStatus::Lent);

        let b1 = ledger.get_borrower("B1").unwrap();
        assert_eq!(b1.open_loans.iter().map(LoanId::as_str).collect::<Vec<_>>(), ["T002"]);
        assert!(ledger.get_borrower("B2").unwrap().open_loans.is_empty());
        assert!(ledger.check_invariants().is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let snapshot = sample();
        let (first, first_report) = Ledger::reconcile(&snapshot, 3);
        let (second, second_report) = Ledger::reconcile(&snapshot, 3);
        assert_eq!(first, second);
        assert_eq!(first_report, second_report);

        let mut reloaded = first.clone();
        reloaded.reload(&snapshot);
        assert_eq!(reloaded, first);
    }

    #[test]
    fn test_status_mismatch_derived_wins() {
        let mut snapshot = sample();
        snapshot.items[0].status = "AVAILABLE".into();
        snapshot.items[1].status = "BORROWED".into();

        let (ledger, report) = Ledger::reconcile(&snapshot, 3);
        assert_eq!(ledger.get_item("I1").unwrap().status, ItemStatus::Lent);
        assert_eq!(ledger.get_item("I2").unwrap().status, ItemStatus::Available);
        assert_eq!(
            report.warnings,
            vec![
                ReconcileWarning::StatusMismatch {
                    item: "I1".into(),
                    stored: ItemStatus::Available,
                    derived: ItemStatus::Lent,
                },
                ReconcileWarning::StatusMismatch {
                    item: "I2".into(),
                    stored: ItemStatus::Lent,
                    derived: ItemStatus::Available,
                },
            ]
        );
        assert!(ledger.check_invariants().is_empty());
    }

    #[test]
    fn test_empty_snapshot_starts_sequence_at_one() {
        let (ledger, report) = Ledger::reconcile(&StoreSnapshot::default(), 3);
        assert_eq!(ledger.next_loan_id().as_str(), "T001");
        assert_eq!(report.next_loan_id, "T001");
        assert!(report.is_clean());
    }

    #[test]
    fn test_unparsable_ids_do_not_move_sequence() {
        let mut snapshot = sample();
        snapshot.loans = vec![loan_row("legacy", "I2", "B1", false)];
        snapshot.items[0].status = "AVAILABLE".into();

        let (ledger, report) = Ledger::reconcile(&snapshot, 3);
        assert!(report.is_clean());
        assert_eq!(ledger.next_loan_id().as_str(), "T001");
        assert!(ledger.get_loan(&LoanId::parse("legacy")).is_some());
    }

    #[test]
    fn test_orphan_and_duplicate_loans_are_reported() {
        let mut snapshot = sample();
        snapshot.loans.push(loan_row("T010", "I1", "B2", true));
        snapshot.loans.push(loan_row("T011", "I9", "B9", true));

        let (ledger, report) = Ledger::reconcile(&snapshot, 3);
        assert!(report.warnings.contains(&ReconcileWarning::OrphanLoan {
            loan: LoanId::parse("T011"),
            missing: MissingSide::Item,
        }));
        assert!(report.warnings.contains(&ReconcileWarning::OrphanLoan {
            loan: LoanId::parse("T011"),
            missing: MissingSide::Borrower,
        }));
        assert!(report.warnings.contains(&ReconcileWarning::DuplicateOpenLoan {
            item: "I1".into(),
            loans: vec![LoanId::parse("T002"), LoanId::parse("T010")],
        }));
        assert_eq!(ledger.next_loan_id().as_str(), "T012");
        assert_eq!(ledger.get_borrower("B2").unwrap().open_count(), 1);
        assert_eq!(report.orphaned_loans, 1);
        assert_eq!(report.open_loans, 2);
        assert!(ledger.get_loan(&LoanId::parse("T011")).is_some());
    }

    #[test]
    fn test_orphan_loans_stay_out_of_derived_state() {
        let snapshot = StoreSnapshot {
            items: vec![item_row("I1", "LENT")],
            borrowers: vec![borrower_row("B2")],
            loans: vec![
                loan_row("T001", "I1", "B1", true),
                loan_row("T002", "I9", "B2", true),
            ],
        };

        let (mut ledger, report) = Ledger::reconcile(&snapshot, 3);
        assert_eq!(
            report.warnings,
            vec![
                ReconcileWarning::OrphanLoan {
                    loan: LoanId::parse("T001"),
                    missing: MissingSide::Borrower,
                },
                ReconcileWarning::OrphanLoan {
                    loan: LoanId::parse("T002"),
                    missing: MissingSide::Item,
                },
                ReconcileWarning::StatusMismatch {
                    item: "I1".into(),
                    stored: ItemStatus::Lent,
                    derived: ItemStatus::Available,
                },
            ]
        );
        assert_eq!(report.open_loans, 0);
        assert_eq!(report.orphaned_loans, 2);
        assert_eq!(ledger.get_item("I1").unwrap().status, ItemStatus::Available);
        assert!(ledger.get_borrower("B2").unwrap().open_loans.is_empty());
        assert_eq!(ledger.orphaned_loans().len(), 2);
        assert!(ledger.check_invariants().is_empty());

        // Re-adding the missing borrower does not resurrect the orphan
        ledger.add_borrower(NewBorrower::new("B1", "Returning")).unwrap();
        assert!(ledger.check_invariants().is_empty());

        let loan = ledger.borrow("I1", "B1").unwrap();
        assert_eq!(loan.id.as_str(), "T003");
        ledger.return_item("I1", "B1").unwrap();
        ledger.remove_borrower("B2").unwrap();
        ledger.remove_item("I1").unwrap();
        assert!(ledger.check_invariants().is_empty());
        assert!(ledger.get_loan(&LoanId::parse("T001")).unwrap().open);
    }

    #[test]
    fn test_return_time_overrides_open_flag() {
        let mut snapshot = StoreSnapshot {
            items: vec![item_row("I1", "AVAILABLE"), item_row("I2", "LENT")],
            borrowers: vec![borrower_row("B1")],
            loans: vec![
                loan_row("T001", "I1", "B1", false),
                loan_row("T002", "I2", "B1", true),
            ],
        };
        snapshot.loans[0].open = true;
        snapshot.loans[1].open = false;

        let (ledger, report) = Ledger::reconcile(&snapshot, 3);
        assert_eq!(
            report.warnings,
            vec![
                ReconcileWarning::OpenFlagMismatch {
                    loan: LoanId::parse("T001"),
                    stored_open: true,
                    returned: true,
                },
                ReconcileWarning::OpenFlagMismatch {
                    loan: LoanId::parse("T002"),
                    stored_open: false,
                    returned: false,
                },
            ]
        );
        assert!(!ledger.get_loan(&LoanId::parse("T001")).unwrap().open);
        assert!(ledger.get_loan(&LoanId::parse("T002")).unwrap().open);
        assert_eq!(ledger.get_item("I2").unwrap().status, ItemStatus::Lent);
        assert!(ledger.check_invariants().is_empty());
    }

    #[test]
    fn test_limit_exceeded_is_reported() {
        let snapshot = StoreSnapshot {
            items: vec![item_row("I1", "LENT"), item_row("I2", "LENT")],
            borrowers: vec![borrower_row("B1")],
            loans: vec![
                loan_row("T001", "I1", "B1", true),
                loan_row("T002", "I2", "B1", true),
            ],
        };

        let (mut ledger, report) = Ledger::reconcile(&snapshot, 1);
        assert_eq!(
            report.warnings,
            vec![ReconcileWarning::LimitExceeded {
                borrower: "B1".into(),
                open: 2,
                limit: 1
            }]
        );
        ledger.return_item("I1", "B1").unwrap();
        ledger.return_item("I2", "B1").unwrap();
        assert!(ledger.check_invariants().is_empty());
    }
}
