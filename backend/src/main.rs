use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pair_token_indexer::api::{create_app, ApiState};
use pair_token_indexer::config::AppConfig;
use pair_token_indexer::database::{MigrationRunner, PgTokenRepository};
use pair_token_indexer::ledger::RpcLedger;
use pair_token_indexer::token_registry::{IngestionScheduler, TokenIngestionService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    MigrationRunner::new(pool.clone()).run_migrations().await?;
    info!("✅ Database ready");

    let repository = Arc::new(PgTokenRepository::new(pool));

    let scheduler = match &config.ledger {
        Some(ledger_config) => {
            match RpcLedger::connect(&ledger_config.rpc_url, ledger_config.factory_address).await {
                Ok(ledger) => {
                    let service = Arc::new(TokenIngestionService::new(
                        Arc::new(ledger),
                        repository.clone(),
                        repository.clone(),
                        config.ingestion.clone(),
                    ));
                    info!("✅ Token ingestion initialized for factory {}", ledger_config.factory_address);
                    Some(Arc::new(IngestionScheduler::new(service, config.ingestion.interval)))
                }
                Err(e) => {
                    warn!("⚠️ Failed to connect to {}: {}", ledger_config.rpc_url, e);
                    info!("Continuing without token ingestion...");
                    None
                }
            }
        }
        None => {
            info!("RPC_URL and PAIR_FACTORY_ADDRESS not set, token ingestion disabled");
            None
        }
    };

    if let Some(scheduler) = &scheduler {
        if config.ingestion.run_on_startup || config.ingestion.interval.is_some() {
            scheduler.start().await;
        }
    }

    let app = create_app(ApiState::new(repository, scheduler.clone()));

    let listener = tokio::net::TcpListener::bind(config.server_addr()).await?;
    info!("🚀 Server is running on http://{}", config.server_addr());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    info!("✅ Server stopped gracefully");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, stopping server...");
}
