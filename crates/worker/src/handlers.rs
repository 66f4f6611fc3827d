// Delivery handlers for the outbox worker
// Decision: One POST per record, no retry inside the handler; retries come from the event store

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use userrole_core::EventRecord;
use userrole_outbox::{EventHandler, HandlerError};

/// Posts each record as JSON to a fixed URL.
///
/// The request body is `{event_id, event_type, subject, data}`; `data` is
/// embedded as JSON when it parses and as a string otherwise. Any non-2xx
/// status counts as a failed delivery.
pub struct WebhookHandler {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookHandler {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn body(event: &EventRecord) -> Value {
        let data = serde_json::from_str::<Value>(&event.data)
            .unwrap_or_else(|_| Value::String(event.data.clone()));
        json!({
            "event_id": event.event_id,
            "event_type": event.event_type,
            "subject": event.subject,
            "data": data,
        })
    }
}

#[async_trait]
impl EventHandler for WebhookHandler {
    async fn handle(&self, event: &EventRecord) -> Result<(), HandlerError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header("X-Event-Id", event.event_id.to_string())
            .json(&Self::body(event))
            .send()
            .await
            .map_err(|e| HandlerError::failed(format!("webhook request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HandlerError::failed(format!(
                "webhook returned error status {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        tracing::debug!(event_id = event.event_id, %status, "webhook delivered");
        Ok(())
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
