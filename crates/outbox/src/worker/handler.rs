//! Event handlers and dispatch by event type

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use userrole_core::{EventRecord, ProcessingOutcome};

/// Handler errors; the message ends up in the record's `error_message`
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Payload could not be decoded for this event type
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The side effect failed
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidPayload(e.to_string())
    }
}

/// Side effect for one kind of event.
///
/// Delivery is at-least-once, so handlers should tolerate seeing the same
/// record more than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EventRecord) -> Result<(), HandlerError>;
}

/// Maps `event_type` to the handler responsible for it
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    fallback: Option<Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for this event type
    pub fn register(&mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(event_type.into(), handler);
    }

    /// Builder form of [`HandlerRegistry::register`]
    pub fn with_handler(
        mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.register(event_type, handler);
        self
    }

    /// Handler used for event types with no specific registration
    pub fn with_fallback(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn get(&self, event_type: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(event_type).or(self.fallback.as_ref())
    }

    /// Registered event types, sorted
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Run the matching handler and turn its result into an outcome
    pub async fn dispatch(&self, event: &EventRecord) -> ProcessingOutcome {
        match self.get(&event.event_type) {
            Some(handler) => handler.handle(event).await.into(),
            None => ProcessingOutcome::failed(format!(
                "no handler registered for event type {}",
                event.event_type
            )),
        }
    }
}

/// Logs each record and reports success.
///
/// Used as the fallback when no side effect is configured, so records still
/// drain instead of piling up as exhausted.
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &EventRecord) -> Result<(), HandlerError> {
        tracing::info!(
            event_id = event.event_id,
            event_type = %event.event_type,
            subject = %event.subject,
            attempts = event.attempts,
            "event delivered"
        );
        Ok(())
    }
}
