//! Lending service
//!
//! Owns the process's single [`Ledger`] behind one lock. Each operation runs
//! its whole check-and-mutate step under that lock, releases it, and only
//! then hands the resulting writes to the persistence bridge. A second lock
//! keeps those writes in the order the ledger committed them.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    bridge::{MirrorOp, MirrorOutcome, PersistenceBridge},
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    ledger::{Ledger, ReconcileReport},
    models::{
        borrower::{Borrower, BorrowerSort, NewBorrower, UpdateBorrower},
        item::{Item, ItemSort, NewItem, UpdateItem},
        loan::{LoanId, LoanRecord},
    },
    repository::LedgerStore,
};

/// Where committed changes currently end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageMode {
    Persistent,
    InMemory,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Persistent => write!(f, "Database"),
            StorageMode::InMemory => write!(f, "In-Memory"),
        }
    }
}

/// Status line of the running ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    pub storage: StorageMode,
    pub items: usize,
    pub borrowers: usize,
    pub loans: usize,
    pub open_loans: usize,
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Storage: {} | Items: {}, Borrowers: {}, Loans: {} ({} open)",
            self.storage, self.items, self.borrowers, self.loans, self.open_loans
        )
    }
}

#[derive(Clone)]
pub struct LendingService {
    ledger: Arc<Mutex<Ledger>>,
    bridge: Option<Arc<PersistenceBridge>>,
    /// Held from commit until the matching mirror writes finish
    mirror_order: Arc<Mutex<()>>,
}

impl LendingService {
    /// Ledger with no store at all
    pub fn in_memory(max_loans: usize) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger::with_max_loans(max_loans))),
            bridge: None,
            mirror_order: Arc::new(Mutex::new(())),
        }
    }

    /// Ledger mirrored to `store`
    pub fn with_store(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger::with_max_loans(config.max_loans))),
            bridge: Some(Arc::new(PersistenceBridge::new(store, config.mirror_timeout()))),
            mirror_order: Arc::new(Mutex::new(())),
        }
    }

    pub fn storage_mode(&self) -> StorageMode {
        match &self.bridge {
            Some(bridge) if bridge.is_enabled() => StorageMode::Persistent,
            _ => StorageMode::InMemory,
        }
    }

    /// Replace the in-memory state with a reconciled bulk load of the store
    pub async fn load(&self) -> LedgerResult<ReconcileReport> {
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| LedgerError::StoreUnavailable("no store configured".to_string()))?;

        let snapshot = bridge.load().await?;
        let report = self.ledger.lock().await.reload(&snapshot);

        for warning in &report.warnings {
            tracing::warn!("Reconciliation: {}", warning);
        }
        tracing::info!(
            "Ledger reconciled: {} item(s), {} borrower(s), {} loan(s), {} open, next loan {}",
            report.items,
            report.borrowers,
            report.loans,
            report.open_loans,
            report.next_loan_id
        );
        Ok(report)
    }

    // ---------------------------------------------------------------------
    // Items
    // ---------------------------------------------------------------------

    pub async fn add_item(&self, item: NewItem) -> LedgerResult<Item> {
        self.commit(|ledger| {
            let item = ledger.add_item(item)?;
            tracing::debug!("Added item {}", item.id);
            let ops = vec![MirrorOp::SaveItem((&item).into())];
            Ok((item, ops))
        })
        .await
    }

    pub async fn update_item(&self, id: &str, fields: UpdateItem) -> LedgerResult<Item> {
        self.commit(|ledger| {
            let item = ledger.update_item(id, fields)?;
            tracing::debug!("Updated item {}", item.id);
            let ops = vec![MirrorOp::SaveItem((&item).into())];
            Ok((item, ops))
        })
        .await
    }

    pub async fn remove_item(&self, id: &str) -> LedgerResult<Item> {
        self.commit(|ledger| {
            let item = ledger.remove_item(id)?;
            tracing::debug!("Removed item {}", item.id);
            let ops = vec![MirrorOp::DeleteItem(item.id.clone())];
            Ok((item, ops))
        })
        .await
    }

    pub async fn get_item(&self, id: &str) -> LedgerResult<Item> {
        self.ledger.lock().await.get_item(id)
    }

    pub async fn list_items(&self, sort: ItemSort) -> Vec<Item> {
        self.ledger.lock().await.list_items(sort)
    }

    // ---------------------------------------------------------------------
    // Borrowers
    // ---------------------------------------------------------------------

    pub async fn add_borrower(&self, borrower: NewBorrower) -> LedgerResult<Borrower> {
        self.commit(|ledger| {
            let borrower = ledger.add_borrower(borrower)?;
            tracing::debug!("Added borrower {}", borrower.id);
            let ops = vec![MirrorOp::SaveBorrower((&borrower).into())];
            Ok((borrower, ops))
        })
        .await
    }

    pub async fn update_borrower(&self, id: &str, fields: UpdateBorrower) -> LedgerResult<Borrower> {
        self.commit(|ledger| {
            let borrower = ledger.update_borrower(id, fields)?;
            tracing::debug!("Updated borrower {}", borrower.id);
            let ops = vec![MirrorOp::SaveBorrower((&borrower).into())];
            Ok((borrower, ops))
        })
        .await
    }

    pub async fn remove_borrower(&self, id: &str) -> LedgerResult<Borrower> {
        self.commit(|ledger| {
            let borrower = ledger.remove_borrower(id)?;
            tracing::debug!("Removed borrower {}", borrower.id);
            let ops = vec![MirrorOp::DeleteBorrower(borrower.id.clone())];
            Ok((borrower, ops))
        })
        .await
    }

    pub async fn get_borrower(&self, id: &str) -> LedgerResult<Borrower> {
        self.ledger.lock().await.get_borrower(id)
    }

    pub async fn list_borrowers(&self, sort: BorrowerSort) -> Vec<Borrower> {
        self.ledger.lock().await.list_borrowers(sort)
    }

    // ---------------------------------------------------------------------
    // Loans
    // ---------------------------------------------------------------------

    /// Lend an item; returns the new loan id
    pub async fn borrow(&self, item_id: &str, borrower_id: &str) -> LedgerResult<LoanId> {
        self.commit(|ledger| {
            let loan = ledger.borrow(item_id, borrower_id)?;
            let item = ledger.get_item(item_id)?;
            tracing::debug!("Loan {}: {} -> {}", loan.id, item_id, borrower_id);
            let ops = vec![
                MirrorOp::SaveItem((&item).into()),
                MirrorOp::AppendLoan((&loan).into()),
            ];
            Ok((loan.id, ops))
        })
        .await
    }

    /// Return an item; returns the closed loan record
    pub async fn return_item(&self, item_id: &str, borrower_id: &str) -> LedgerResult<LoanRecord> {
        self.commit(|ledger| {
            let loan = ledger.return_item(item_id, borrower_id)?;
            let item = ledger.get_item(item_id)?;
            tracing::debug!("Loan {} closed: {} <- {}", loan.id, item_id, borrower_id);
            let ops = vec![
                MirrorOp::SaveItem((&item).into()),
                MirrorOp::CloseLoan((&loan).into()),
            ];
            Ok((loan, ops))
        })
        .await
    }

    pub async fn list_loans(&self) -> Vec<LoanRecord> {
        self.ledger.lock().await.list_loans()
    }

    /// Loans of a borrower, optionally only the open ones
    pub async fn loans_for_borrower(&self, borrower_id: &str, open_only: bool) -> LedgerResult<Vec<LoanRecord>> {
        self.ledger.lock().await.loans_for_borrower(borrower_id, open_only)
    }

    pub async fn open_loan_for_item(&self, item_id: &str) -> LedgerResult<Option<LoanRecord>> {
        self.ledger.lock().await.open_loan_for_item(item_id)
    }

    /// Count active loans
    pub async fn count_active(&self) -> usize {
        self.ledger.lock().await.count_active()
    }

    pub async fn status(&self) -> LedgerStatus {
        let summary = self.ledger.lock().await.summary();
        LedgerStatus {
            storage: self.storage_mode(),
            items: summary.items,
            borrowers: summary.borrowers,
            loans: summary.loans,
            open_loans: summary.open_loans,
        }
    }

    /// Copy of the current ledger
    pub async fn snapshot(&self) -> Ledger {
        self.ledger.lock().await.clone()
    }

    /// Apply `change` under the ledger lock, then mirror its writes.
    ///
    /// The mirror-order guard is taken before the ledger lock is released,
    /// so store writes land in commit order. The store is only called once
    /// the ledger lock is gone.
    async fn commit<T, F>(&self, change: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut Ledger) -> LedgerResult<(T, Vec<MirrorOp>)>,
    {
        let (value, ops, turn) = {
            let mut ledger = self.ledger.lock().await;
            let (value, ops) = change(&mut *ledger).map_err(|e| {
                tracing::debug!(code = e.code() as u32, "Rejected: {}", e);
                e
            })?;
            let turn = match &self.bridge {
                Some(bridge) if bridge.is_enabled() => {
                    Some(self.mirror_order.clone().lock_owned().await)
                }
                _ => None,
            };
            (value, ops, turn)
        };

        if let (Some(bridge), Some(_turn)) = (&self.bridge, turn) {
            if let MirrorOutcome::Failed(e) = bridge.mirror(ops).await {
                tracing::warn!("Change kept in memory only: {}", e);
            }
        }
        Ok(value)
    }
}
