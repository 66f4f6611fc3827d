// Userrole API server
// Decision: Without DATABASE_URL the server runs on in-memory storage (dev mode)
// Decision: The in-process outbox worker only logs events; real delivery runs in userrole-worker

use std::sync::Arc;

use anyhow::{Context, Result};
use userrole_control_plane::app::build_app;
use userrole_control_plane::config::ServerConfig;
use userrole_control_plane::storage::StorageBackend;
use userrole_core::telemetry::{init_telemetry, TelemetryConfig};
use userrole_outbox::{HandlerRegistry, LoggingHandler, OutboxWorker, PollerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "userrole" {
        telemetry_config.service_name = "userrole-control-plane".to_string();
    }
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter = Some(
            "userrole_control_plane=debug,userrole_outbox=info,tower_http=debug".to_string(),
        );
    }
    telemetry_config.service_version = Some(env!("CARGO_PKG_VERSION").to_string());
    init_telemetry(telemetry_config);

    tracing::info!("userrole-control-plane starting...");

    let config = ServerConfig::from_env().context("Invalid server configuration")?;

    let backend = match &config.database_url {
        Some(url) => {
            let backend = StorageBackend::postgres(
                url,
                config.database_max_connections,
                config.database_acquire_timeout,
            )
            .await
            .context("Failed to connect to database")?;
            tracing::info!("Connected to database");
            backend
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage (data is lost on exit)");
            StorageBackend::in_memory()
        }
    };
    let backend = Arc::new(backend);

    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }
    if config.cors_allowed_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    }

    let worker = if config.inprocess_worker {
        let registry = HandlerRegistry::new().with_fallback(Arc::new(LoggingHandler));
        let mut worker = OutboxWorker::new(
            backend.event_store(),
            registry,
            "control-plane",
            PollerConfig::new().with_max_attempts(config.outbox_max_attempts),
        );
        let handle = worker.shutdown_handle();
        let task = tokio::spawn(async move { worker.run().await });
        tracing::info!(
            max_attempts = config.outbox_max_attempts,
            "In-process outbox worker started"
        );
        Some((handle, task))
    } else {
        None
    };

    let app = build_app(backend, &config);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some((handle, task)) = worker {
        handle.shutdown();
        match task.await {
            Ok(stats) => tracing::info!(
                processed = stats.processed,
                failed = stats.failed,
                unreported = stats.unreported,
                expired = stats.expired,
                "Outbox worker stopped"
            ),
            Err(e) => tracing::error!(error = %e, "Outbox worker task failed"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
