//! Notification sink — best-effort case updates to a chat channel.
//!
//! Failures here are logged by the engine and never fail a workflow.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Best-effort notification contract.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, case_id: &str, message: &str) -> Result<(), NotifyError>;
}

/// Notification delivery error. Deliberately not part of the main
/// error taxonomy: callers log it and move on.
#[derive(Debug, thiserror::Error)]
#[error("Notification for case {case_id} failed: {reason}")]
pub struct NotifyError {
    pub case_id: String,
    pub reason: String,
}

/// Slack `chat.postMessage` notifier.
pub struct SlackNotifier {
    client: reqwest::Client,
    token: SecretString,
    channel: String,
}

impl SlackNotifier {
    pub fn new(client: reqwest::Client, token: SecretString, channel: String) -> Self {
        Self {
            client,
            token,
            channel,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, case_id: &str, message: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "channel": self.channel,
            "text": "Service Request Update",
            "attachments": [{
                "color": "good",
                "title": format!("Service Request: {case_id}"),
                "text": message,
                "footer": "maildesk",
                "ts": Utc::now().timestamp()
            }]
        });

        let response = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(self.token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError {
                case_id: case_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError {
                case_id: case_id.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        debug!(case_id = %case_id, channel = %self.channel, "Notification delivered");
        Ok(())
    }
}

/// No-op notifier for deployments without a chat token.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, case_id: &str, _message: &str) -> Result<(), NotifyError> {
        debug!(case_id = %case_id, "Notification skipped (no token configured)");
        Ok(())
    }
}
