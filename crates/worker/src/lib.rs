// Userrole outbox worker
// Decision: Shared library for the worker binary and its tests

pub mod config;
pub mod handlers;

use std::sync::Arc;

use userrole_outbox::{HandlerRegistry, LoggingHandler};

pub use config::WorkerConfig;
pub use handlers::WebhookHandler;

/// Worker startup errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("{0} environment variable required")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Handlers for every event type, per configuration
pub fn build_registry(config: &WorkerConfig) -> HandlerRegistry {
    match &config.webhook_url {
        Some(url) => HandlerRegistry::new().with_fallback(Arc::new(WebhookHandler::new(
            url.clone(),
            config.webhook_timeout,
        ))),
        None => HandlerRegistry::new().with_fallback(Arc::new(LoggingHandler)),
    }
}
