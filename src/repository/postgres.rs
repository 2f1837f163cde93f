//! PostgreSQL store

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use super::LedgerStore;
use crate::{
    config::DatabaseConfig,
    error::StoreError,
    models::rows::{BorrowerRow, ItemRow, LoanRow, StoreSnapshot},
};

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Open a connection pool for the configured database
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the items, borrowers and loans tables if they are missing
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn upsert_loan(&self, loan: &LoanRow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO loans (id, item_id, borrower_id, borrowed_at, returned_at, open)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET item_id = EXCLUDED.item_id,
                borrower_id = EXCLUDED.borrower_id,
                borrowed_at = EXCLUDED.borrowed_at,
                returned_at = EXCLUDED.returned_at,
                open = EXCLUDED.open
            "#,
        )
        .bind(&loan.id)
        .bind(&loan.item_id)
        .bind(&loan.borrower_id)
        .bind(loan.borrowed_at)
        .bind(loan.returned_at)
        .bind(loan.open)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn save_item(&self, item: &ItemRow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO items (id, title, creator, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                creator = EXCLUDED.creator,
                status = EXCLUDED.status
            "#,
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.creator)
        .bind(&item.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_borrower(&self, borrower: &BorrowerRow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO borrowers (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(&borrower.id)
        .bind(&borrower.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_borrower(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM borrowers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_loan(&self, loan: &LoanRow) -> Result<(), StoreError> {
        self.upsert_loan(loan).await
    }

    async fn close_loan(&self, loan: &LoanRow) -> Result<(), StoreError> {
        // Upsert rather than UPDATE so a close also heals a missed append
        self.upsert_loan(loan).await
    }

    async fn load_all(&self) -> Result<StoreSnapshot, StoreError> {
        let items = sqlx::query_as::<_, ItemRow>(
            "SELECT id, title, creator, status FROM items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let borrowers = sqlx::query_as::<_, BorrowerRow>(
            "SELECT id, name FROM borrowers ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let loans = sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT id, item_id, borrower_id, borrowed_at, returned_at, open
            FROM loans
            ORDER BY borrowed_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(StoreSnapshot {
            items,
            borrowers,
            loans,
        })
    }
}
