//! Persistence port for the lending ledger
//!
//! A store only needs record-level upserts and a bulk load; it never sees
//! ledger rules. [`postgres::PgStore`] is the production adapter and
//! [`MemoryStore`] an in-process one for tests and demos.

pub mod postgres;

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::{
    error::StoreError,
    models::rows::{BorrowerRow, ItemRow, LoanRow, StoreSnapshot},
};

pub use postgres::PgStore;

/// Record-level contract with an external store.
///
/// All writes are idempotent upserts keyed by the row id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn save_item(&self, item: &ItemRow) -> Result<(), StoreError>;

    async fn delete_item(&self, id: &str) -> Result<(), StoreError>;

    async fn save_borrower(&self, borrower: &BorrowerRow) -> Result<(), StoreError>;

    async fn delete_borrower(&self, id: &str) -> Result<(), StoreError>;

    async fn append_loan(&self, loan: &LoanRow) -> Result<(), StoreError>;

    async fn close_loan(&self, loan: &LoanRow) -> Result<(), StoreError>;

    /// Full row set of all three tables
    async fn load_all(&self) -> Result<StoreSnapshot, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    items: IndexMap<String, ItemRow>,
    borrowers: IndexMap<String, BorrowerRow>,
    loans: IndexMap<String, LoanRow>,
}

/// In-process store.
///
/// Can be taken offline or slowed down to exercise the write-through path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    offline: AtomicBool,
    latency_ms: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with raw rows
    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.lock() {
            tables.items = snapshot.items.into_iter().map(|r| (r.id.clone(), r)).collect();
            tables.borrowers = snapshot.borrowers.into_iter().map(|r| (r.id.clone(), r)).collect();
            tables.loans = snapshot.loans.into_iter().map(|r| (r.id.clone(), r)).collect();
        }
        store
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        let ms = usize::try_from(latency.as_millis()).unwrap_or(usize::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current rows, bypassing availability and latency
    pub fn snapshot(&self) -> StoreSnapshot {
        match self.tables.lock() {
            Ok(tables) => snapshot_of(&tables),
            Err(poisoned) => snapshot_of(&poisoned.into_inner()),
        }
    }

    async fn ready(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency as u64)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn snapshot_of(tables: &Tables) -> StoreSnapshot {
    StoreSnapshot {
        items: tables.items.values().cloned().collect(),
        borrowers: tables.borrowers.values().cloned().collect(),
        loans: tables.loans.values().cloned().collect(),
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn save_item(&self, item: &ItemRow) -> Result<(), StoreError> {
        self.ready().await?;
        self.tables()?.items.insert(item.id.clone(), item.clone());
        self.wrote();
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<(), StoreError> {
        self.ready().await?;
        self.tables()?.items.shift_remove(id);
        self.wrote();
        Ok(())
    }

    async fn save_borrower(&self, borrower: &BorrowerRow) -> Result<(), StoreError> {
        self.ready().await?;
        self.tables()?
            .borrowers
            .insert(borrower.id.clone(), borrower.clone());
        self.wrote();
        Ok(())
    }

    async fn delete_borrower(&self, id: &str) -> Result<(), StoreError> {
        self.ready().await?;
        self.tables()?.borrowers.shift_remove(id);
        self.wrote();
        Ok(())
    }

    async fn append_loan(&self, loan: &LoanRow) -> Result<(), StoreError> {
        self.ready().await?;
        self.tables()?.loans.insert(loan.id.clone(), loan.clone());
        self.wrote();
        Ok(())
    }

    async fn close_loan(&self, loan: &LoanRow) -> Result<(), StoreError> {
        self.ready().await?;
        self.tables()?.loans.insert(loan.id.clone(), loan.clone());
        self.wrote();
        Ok(())
    }

    async fn load_all(&self) -> Result<StoreSnapshot, StoreError> {
        self.ready().await?;
        let tables = self.tables()?;
        Ok(snapshot_of(&tables))
    }
}
