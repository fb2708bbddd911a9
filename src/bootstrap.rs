use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    api::handler::AppState,
    config::{Config, StoreBackend},
    error::{AppError, AppResult},
    intake::{AccountAdmin, OutcomeIntake, WagerIntake},
    ledger::LedgerAccessor,
    notify::{LogNotifier, Notifier, WebhookNotifier},
    settlement::SettlementEngine,
    store::{DocumentStore, MemoryDocumentStore, PgDocumentStore},
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let store = initialize_store(config).await?;
    info!("✅ {} document store ready", store.name());

    let ledger = Arc::new(LedgerAccessor::new(store, config.retry_policy()));
    info!(
        "✅ Ledger accessor initialized ({} CAS attempts, {}ms..{}ms backoff)",
        config.cas_max_attempts, config.cas_base_delay_ms, config.cas_max_delay_ms
    );

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };
    info!("✅ {} notifier registered", notifier.name());

    let state = AppState {
        wagers: Arc::new(WagerIntake::new(ledger.clone(), notifier.clone())),
        outcomes: Arc::new(OutcomeIntake::new(ledger.clone())),
        accounts: Arc::new(AccountAdmin::new(
            ledger.clone(),
            notifier.clone(),
            config.starting_points,
        )),
        settlement: Arc::new(SettlementEngine::new(ledger.clone(), notifier)),
        ledger,
    };

    Ok(state)
}

async fn initialize_store(config: &Config) -> AppResult<Arc<dyn DocumentStore>> {
    match config.store_backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
        StoreBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                AppError::Config("DATABASE_URL must be set for the postgres store".to_string())
            })?;
            let pool = initialize_database(url, config.db_max_connections).await?;
            Ok(Arc::new(PgDocumentStore::new(pool)))
        }
    }
}

async fn initialize_database(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: {} max connections", max_connections);

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
