//! Lending ledger - startup and status report
//!
//! Connects to the configured store when there is one, reconciles the ledger
//! from it and prints the resulting status. Without a store, or when it
//! cannot be reached, the ledger runs in memory.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lending_ledger::{
    config::AppConfig,
    models::{BorrowerSort, ItemSort},
    repository::PgStore,
    LendingService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("lending_ledger={}", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting lending ledger v{}", env!("CARGO_PKG_VERSION"));

    let service = build_service(&config).await;

    if service.storage_mode() == lending_ledger::services::StorageMode::Persistent {
        match service.load().await {
            Ok(report) if !report.is_clean() => {
                tracing::warn!("Loaded with {} consistency warning(s)", report.warnings.len())
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Starting empty: {}", e),
        }
    }

    let status = service.status().await;
    tracing::info!("{}", status);

    for item in service.list_items(ItemSort::Id).await {
        tracing::info!("  [{}] {} ({})", item.id, item, item.status);
    }
    for borrower in service.list_borrowers(BorrowerSort::Id).await {
        tracing::info!("  {}", borrower);
    }

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Service backed by PostgreSQL when reachable, in-memory otherwise
async fn build_service(config: &AppConfig) -> LendingService {
    let Some(url) = config.database.url.as_deref() else {
        tracing::info!("No database configured, using in-memory storage");
        return LendingService::in_memory(config.ledger.max_loans);
    };

    let store = match PgStore::connect(url, &config.database).await {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("Database not available, using in-memory storage: {}", e);
            return LendingService::in_memory(config.ledger.max_loans);
        }
    };
    tracing::info!("Connected to database");

    if let Err(e) = store.migrate().await {
        tracing::warn!("Database migrations failed, using in-memory storage: {}", e);
        return LendingService::in_memory(config.ledger.max_loans);
    }
    tracing::info!("Database migrations completed");

    LendingService::with_store(Arc::new(store), &config.ledger)
}
