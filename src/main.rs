use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wager_ledger::{bootstrap, config::Config, server};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,wager_ledger=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting wager ledger");

    let config = Config::from_env()?;
    info!("📋 Store backend: {:?}, bind address: {}", config.store_backend, config.bind_address);

    let state = bootstrap::initialize_app_state(&config).await?;

    let app = server::create_app(state, &config.cors_origins, config.request_timeout());
    server::run_server(app, &config.bind_address).await?;

    Ok(())
}
