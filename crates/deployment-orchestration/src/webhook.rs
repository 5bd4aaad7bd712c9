//! State change notifications
//!
//! Background operations report their entity's state when they start and
//! when they finish. Delivery failures are logged and otherwise ignored.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// One observed state of a package or application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChangeEvent {
    /// Package or application name
    pub id: String,
    /// Observed state
    pub state: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    /// Diagnostic attached to the state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub information: Option<String>,
}

impl StateChangeEvent {
    /// Event stamped with the current time
    pub fn now(id: impl Into<String>, state: impl ToString, information: Option<String>) -> Self {
        Self {
            id: id.into(),
            state: state.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            information: information.filter(|info| !info.is_empty()),
        }
    }

    /// Callback body: `{data: [event], timestamp}`
    pub fn payload(&self) -> Value {
        json!({
            "data": [self],
            "timestamp": Utc::now().timestamp_millis(),
        })
    }
}

/// Receives state change events
#[async_trait]
pub trait WebhookSink: Send + Sync {
    /// Deliver `event` to `url`
    async fn notify(&self, url: &str, event: StateChangeEvent);
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWebhook;

#[async_trait]
impl WebhookSink for NullWebhook {
    async fn notify(&self, _url: &str, _event: StateChangeEvent) {}
}

/// POSTs events as JSON
#[derive(Debug, Clone)]
pub struct HttpWebhook {
    client: reqwest::Client,
}

impl HttpWebhook {
    /// Webhook with a per-request timeout
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSink for HttpWebhook {
    async fn notify(&self, url: &str, event: StateChangeEvent) {
        debug!("callback: {} {} {}", url, event.id, event.state);
        let payload = event.payload();
        let client = self.client.clone();
        let target = url.to_string();
        let sent = crate::http::run(async move {
            let response = client
                .post(&target)
                .json(&payload)
                .send()
                .await
                .map_err(|e| crate::Error::FailedConnection(e.to_string()))?;
            Ok(response.status())
        })
        .await;
        match sent {
            Ok(status) if !status.is_success() => {
                warn!("Callback to {} for {} returned {}", url, event.id, status);
            }
            Ok(_) => {}
            Err(err) => warn!("Callback to {} for {} failed: {}", url, event.id, err),
        }
    }
}
