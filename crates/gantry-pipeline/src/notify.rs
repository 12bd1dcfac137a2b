//! Notification transport.
//!
//! Delivery is best-effort: a failed send is logged by the hook dispatcher
//! and never changes an already-terminal run outcome.

use async_trait::async_trait;
use gantry_core::{PipelineError, Result};
use serde::Serialize;
use serde_json::json;

/// Message severity, mapped to the channel's display color.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Danger,
}

impl Severity {
    fn color(self) -> &'static str {
        match self {
            Severity::Info => "good",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

/// Notification collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: &str, message: &str, severity: Severity) -> Result<()>;
}

/// Slack-style incoming-webhook notifier.
pub struct WebhookNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Read the webhook endpoint from `GANTRY_WEBHOOK_URL`.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("GANTRY_WEBHOOK_URL").map_err(|_| {
            PipelineError::InvalidConfig("GANTRY_WEBHOOK_URL is not set".to_string())
        })?;
        Ok(Self::new(endpoint))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, channel: &str, message: &str, severity: Severity) -> Result<()> {
        let payload = json!({
            "channel": channel,
            "attachments": [{
                "color": severity.color(),
                "text": message,
            }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::Notification(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PipelineError::Notification(format!(
                "webhook returned {}",
                response.status()
            )))
        }
    }
}
