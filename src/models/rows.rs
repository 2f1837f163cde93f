//! Raw rows exchanged with the persistent store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{
    borrower::Borrower,
    item::Item,
    loan::LoanRecord,
};

/// items(id, title, creator, status)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ItemRow {
    pub id: String,
    pub title: String,
    pub creator: String,
    pub status: String,
}

impl From<&Item> for ItemRow {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            creator: item.creator.clone(),
            status: item.status.as_str().to_string(),
        }
    }
}

/// borrowers(id, name). Loan membership is not stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BorrowerRow {
    pub id: String,
    pub name: String,
}

impl From<&Borrower> for BorrowerRow {
    fn from(borrower: &Borrower) -> Self {
        Self {
            id: borrower.id.clone(),
            name: borrower.display_name.clone(),
        }
    }
}

/// loans(id, item_id, borrower_id, borrowed_at, returned_at, open)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LoanRow {
    pub id: String,
    pub item_id: String,
    pub borrower_id: String,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub open: bool,
}

impl From<&LoanRecord> for LoanRow {
    fn from(loan: &LoanRecord) -> Self {
        Self {
            id: loan.id.to_string(),
            item_id: loan.item_id.clone(),
            borrower_id: loan.borrower_id.clone(),
            borrowed_at: loan.borrowed_at,
            returned_at: loan.returned_at,
            open: loan.open,
        }
    }
}

/// Full row set of the three tables, as returned by a bulk load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub items: Vec<ItemRow>,
    pub borrowers: Vec<BorrowerRow>,
    pub loans: Vec<LoanRow>,
}
