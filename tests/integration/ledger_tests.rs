//! Ledger integration tests: service, write-through and reload

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};

use lending_ledger::{
    config::LedgerConfig,
    ledger::ReconcileWarning,
    models::{
        BorrowerRow, BorrowerSort, ItemRow, ItemSort, ItemStatus, LoanRow, NewBorrower, NewItem,
        StoreSnapshot,
    },
    repository::MemoryStore,
    services::StorageMode,
    Ledger, LedgerError, LendingService,
};

fn config() -> LedgerConfig {
    LedgerConfig {
        max_loans: 3,
        mirror_timeout_ms: 500,
    }
}

async fn catalog(service: &LendingService, items: &[&str], borrowers: &[&str]) {
    for id in items {
        service
            .add_item(NewItem::new(*id, format!("Title {}", id), "Author"))
            .await
            .expect("add item");
    }
    for id in borrowers {
        service
            .add_borrower(NewBorrower::new(*id, format!("Borrower {}", id)))
            .await
            .expect("add borrower");
    }
}

#[tokio::test]
async fn test_borrow_limit_leaves_ledger_unchanged() {
    let service = LendingService::in_memory(3);
    catalog(&service, &["I1", "I2", "I3", "I4"], &["B1"]).await;
    for id in ["I1", "I2", "I3"] {
        service.borrow(id, "B1").await.expect("borrow");
    }

    let before = service.snapshot().await;
    let err = service.borrow("I4", "B1").await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::BorrowLimitReached {
            borrower: "B1".into(),
            limit: 3
        }
    );
    assert_eq!(service.snapshot().await, before);
}

#[tokio::test]
async fn test_reload_restores_state_and_sequence() {
    let store = Arc::new(MemoryStore::new());

    let first = LendingService::with_store(store.clone(), &config());
    catalog(&first, &["I1", "I2"], &["B1", "B2"]).await;
    first.borrow("I1", "B1").await.expect("borrow");
    first.return_item("I1", "B1").await.expect("return");
    first.borrow("I1", "B2").await.expect("borrow");
    let last = first.borrow("I2", "B2").await.expect("borrow");
    assert_eq!(last.as_str(), "T003");

    // A second process over the same store
    let second = LendingService::with_store(store.clone(), &config());
    let report = second.load().await.expect("load");
    assert!(report.is_clean(), "{:?}", report.warnings);
    assert_eq!(report.next_loan_id, "T004");

    assert_eq!(
        second.get_item("I1").await.expect("item").status,
        ItemStatus::Lent
    );
    let b2 = second.get_borrower("B2").await.expect("borrower");
    assert_eq!(b2.open_count(), 2);
    assert_eq!(second.loans_for_borrower("B1", false).await.expect("loans").len(), 1);

    second.return_item("I2", "B2").await.expect("return");
    let next = second.borrow("I2", "B1").await.expect("borrow");
    assert!(next > last);
    assert_eq!(next.as_str(), "T004");
    assert!(second.snapshot().await.check_invariants().is_empty());
}

#[tokio::test]
async fn test_load_twice_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let writer = LendingService::with_store(store.clone(), &config());
    catalog(&writer, &["I1", "I2"], &["B1"]).await;
    writer.borrow("I2", "B1").await.expect("borrow");

    let reader = LendingService::with_store(store, &config());
    let first_report = tokio_test::assert_ok!(reader.load().await);
    let first = reader.snapshot().await;
    let second_report = tokio_test::assert_ok!(reader.load().await);
    assert_eq!(first_report, second_report);
    assert_eq!(reader.snapshot().await, first);
}

#[tokio::test]
async fn test_partially_written_store_is_reconciled() {
    let at = Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap();
    // Item row saved as lent but the loan row never made it, and an open
    // loan whose item row is still marked available.
    let snapshot = StoreSnapshot {
        items: vec![
            ItemRow {
                id: "I1".into(),
                title: "Clean Code".into(),
                creator: "Martin".into(),
                status: "LENT".into(),
            },
            ItemRow {
                id: "I2".into(),
                title: "Refactoring".into(),
                creator: "Fowler".into(),
                status: "AVAILABLE".into(),
            },
        ],
        borrowers: vec![BorrowerRow {
            id: "B1".into(),
            name: "Ann".into(),
        }],
        loans: vec![LoanRow {
            id: "T041".into(),
            item_id: "I2".into(),
            borrower_id: "B1".into(),
            borrowed_at: at,
            returned_at: None,
            open: true,
        }],
    };

    let service = LendingService::with_store(Arc::new(MemoryStore::with_snapshot(snapshot)), &config());
    let report = service.load().await.expect("load");
    assert_eq!(report.warnings.len(), 2);
    assert!(report
        .warnings
        .iter()
        .all(|w| matches!(w, ReconcileWarning::StatusMismatch { .. })));

    let items = service.list_items(ItemSort::Insertion).await;
    assert_eq!(items[0].status, ItemStatus::Available);
    assert_eq!(items[1].status, ItemStatus::Lent);
    assert_eq!(service.borrow("I1", "B1").await.expect("borrow").as_str(), "T042");
    assert_eq!(service.storage_mode(), StorageMode::Persistent);
}

#[tokio::test]
async fn test_unreachable_store_at_startup() {
    let store = Arc::new(MemoryStore::new());
    store.set_offline(true);
    let service = LendingService::with_store(store, &config());

    assert!(matches!(
        service.load().await,
        Err(LedgerError::StoreUnavailable(_))
    ));
    assert_eq!(service.storage_mode(), StorageMode::InMemory);

    catalog(&service, &["I1"], &["B1"]).await;
    assert_eq!(service.borrow("I1", "B1").await.expect("borrow").as_str(), "T001");
}

#[tokio::test]
async fn test_random_operations_preserve_invariants() {
    let items = ["I1", "I2", "I3", "I4", "I5", "I6"];
    let borrowers = ["B1", "B2", "B3"];
    let mut rng = StdRng::seed_from_u64(0x1ed6e5);
    let mut ledger = Ledger::with_max_loans(2);
    let mut last_seq = 0;

    for step in 0..2000 {
        let item = items[rng.gen_range(0..items.len())];
        let borrower = borrowers[rng.gen_range(0..borrowers.len())];
        match rng.gen_range(0..8) {
            0 => {
                let _ = ledger.add_item(NewItem::new(item, "Title", "Author"));
            }
            1 => {
                let _ = ledger.add_borrower(NewBorrower::new(borrower, "Name"));
            }
            2 => {
                let _ = ledger.remove_item(item);
            }
            3 => {
                let _ = ledger.remove_borrower(borrower);
            }
            4 | 5 => {
                if let Ok(loan) = ledger.borrow(item, borrower) {
                    assert!(loan.id.seq() > last_seq, "step {}", step);
                    last_seq = loan.id.seq();
                }
            }
            _ => {
                let _ = ledger.return_item(item, borrower);
            }
        }
        assert_eq!(ledger.check_invariants(), vec![], "step {}", step);
    }

    for borrower in ledger.list_borrowers(BorrowerSort::Insertion) {
        assert!(borrower.open_count() <= 2);
    }
}
