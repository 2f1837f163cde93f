//! Best-effort write-through from the ledger to an external store
//!
//! The ledger commits first; the bridge then mirrors the change. Any store
//! failure or timeout disables the bridge for the rest of the process and
//! the ledger carries on in memory.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    error::{LedgerError, LedgerResult, StoreError},
    models::rows::{BorrowerRow, ItemRow, LoanRow, StoreSnapshot},
    repository::LedgerStore,
};

/// One record-level write derived from a committed ledger mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOp {
    SaveItem(ItemRow),
    DeleteItem(String),
    SaveBorrower(BorrowerRow),
    DeleteBorrower(String),
    AppendLoan(LoanRow),
    CloseLoan(LoanRow),
}

impl MirrorOp {
    fn describe(&self) -> String {
        match self {
            MirrorOp::SaveItem(row) => format!("save item {}", row.id),
            MirrorOp::DeleteItem(id) => format!("delete item {}", id),
            MirrorOp::SaveBorrower(row) => format!("save borrower {}", row.id),
            MirrorOp::DeleteBorrower(id) => format!("delete borrower {}", id),
            MirrorOp::AppendLoan(row) => format!("append loan {}", row.id),
            MirrorOp::CloseLoan(row) => format!("close loan {}", row.id),
        }
    }
}

/// Result of a mirror attempt. Never affects the ledger.
#[derive(Debug)]
pub enum MirrorOutcome {
    /// Every write reached the store
    Mirrored,
    /// Bridge already disabled, nothing attempted
    Skipped,
    /// A write failed; the bridge is now disabled
    Failed(StoreError),
}

pub struct PersistenceBridge {
    store: Arc<dyn LedgerStore>,
    enabled: AtomicBool,
    timeout: Duration,
}

impl PersistenceBridge {
    pub fn new(store: Arc<dyn LedgerStore>, timeout: Duration) -> Self {
        Self {
            store,
            enabled: AtomicBool::new(true),
            timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn the mirror off for the remaining lifetime of the process
    pub fn disable(&self, reason: &str) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            tracing::warn!("Persistence disabled, continuing in memory: {}", reason);
        }
    }

    /// Apply `ops` in order, stopping at the first failure
    pub async fn mirror(&self, ops: Vec<MirrorOp>) -> MirrorOutcome {
        if !self.is_enabled() {
            tracing::debug!("Store disabled, skipping {} mirror write(s)", ops.len());
            return MirrorOutcome::Skipped;
        }

        for op in ops {
            if let Err(e) = self.apply(&op).await {
                tracing::error!("Mirror write failed ({}): {}", op.describe(), e);
                self.disable(&e.to_string());
                return MirrorOutcome::Failed(e);
            }
            tracing::debug!("Mirrored {}", op.describe());
        }

        MirrorOutcome::Mirrored
    }

    /// Read every row from the store for reconciliation
    pub async fn load(&self) -> LedgerResult<StoreSnapshot> {
        if !self.is_enabled() {
            return Err(LedgerError::StoreUnavailable("store disabled".to_string()));
        }

        let result = match tokio::time::timeout(self.timeout, self.store.load_all()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        };

        match result {
            Ok(snapshot) => {
                tracing::info!(
                    "Loaded {} item(s), {} borrower(s), {} loan(s) from store",
                    snapshot.items.len(),
                    snapshot.borrowers.len(),
                    snapshot.loans.len()
                );
                Ok(snapshot)
            }
            Err(e) => {
                tracing::error!("Store load failed: {}", e);
                self.disable(&e.to_string());
                Err(e.into())
            }
        }
    }

    async fn apply(&self, op: &MirrorOp) -> Result<(), StoreError> {
        let store = self.store.as_ref();
        let write = async {
            match op {
                MirrorOp::SaveItem(row) => store.save_item(row).await,
                MirrorOp::DeleteItem(id) => store.delete_item(id).await,
                MirrorOp::SaveBorrower(row) => store.save_borrower(row).await,
                MirrorOp::DeleteBorrower(id) => store.delete_borrower(id).await,
                MirrorOp::AppendLoan(row) => store.append_loan(row).await,
                MirrorOp::CloseLoan(row) => store.close_loan(row).await,
            }
        };

        match tokio::time::timeout(self.timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}
