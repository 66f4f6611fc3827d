use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use userrole_core::telemetry::{init_telemetry, TelemetryConfig};
use userrole_outbox::{OutboxWorker, PostgresEventStore};
use userrole_worker::{build_registry, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "userrole" {
        telemetry_config.service_name = "userrole-worker".to_string();
    }
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter = Some("userrole_worker=debug,userrole_outbox=info".to_string());
    }
    telemetry_config.service_version = Some(env!("CARGO_PKG_VERSION").to_string());
    init_telemetry(telemetry_config);

    tracing::info!("userrole-worker starting...");

    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Connected to database");

    let registry = build_registry(&config);
    match &config.webhook_url {
        Some(url) => tracing::info!(url = %url, "Delivering events to webhook"),
        None => tracing::info!("OUTBOX_WEBHOOK_URL not set, logging events only"),
    }

    tracing::info!(
        worker_id = %config.worker_id,
        max_attempts = config.poller.max_attempts,
        batch_size = config.poller.batch_size,
        lease_secs = config.poller.lease.as_secs(),
        "Starting outbox worker"
    );

    let store = Arc::new(PostgresEventStore::new(pool));
    let mut worker = OutboxWorker::new(store, registry, config.worker_id.clone(), config.poller)
        .with_handler_timeout(config.handler_timeout);
    let shutdown = worker.shutdown_handle();

    // Let the current batch finish after Ctrl-C
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown.shutdown();
        }
    });

    let stats = worker.run().await;
    signal.abort();

    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        unreported = stats.unreported,
        expired = stats.expired,
        "Worker shutdown complete"
    );
    Ok(())
}
