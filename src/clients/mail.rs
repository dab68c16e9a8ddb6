//! Mail gateway — unread fetch, mark-read, and send against a
//! Graph-style mailbox REST API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::MailError;

/// Read-only snapshot of one inbound mail message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Provider message id (used for mark-read).
    pub id: String,
    /// Requester identity (sender address).
    pub sender: String,
    pub subject: String,
    pub body: String,
    /// Provider-assigned thread identifier grouping related messages.
    pub conversation_id: String,
    pub has_attachments: bool,
}

/// Narrow mailbox contract consumed by the scheduler and engine.
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Fetch the current batch of unread messages.
    async fn fetch_unread(&self, token: &str) -> Result<Vec<InboundMessage>, MailError>;

    /// Mark one message as read so the next fetch skips it.
    async fn mark_read(&self, token: &str, message_id: &str) -> Result<(), MailError>;

    /// Send an HTML mail (questionnaire forms, confirmations).
    async fn send(
        &self,
        token: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError>;
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    value: Vec<MessageResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResource {
    id: String,
    subject: Option<String>,
    from: AddressWrapper,
    body: BodyResource,
    conversation_id: String,
    #[serde(default)]
    has_attachments: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressWrapper {
    email_address: EmailAddress,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    address: String,
}

#[derive(Debug, Deserialize)]
struct BodyResource {
    content: String,
}

impl From<MessageResource> for InboundMessage {
    fn from(m: MessageResource) -> Self {
        Self {
            id: m.id,
            sender: m.from.email_address.address,
            subject: m.subject.unwrap_or_default(),
            body: m.body.content,
            conversation_id: m.conversation_id,
            has_attachments: m.has_attachments,
        }
    }
}

// ── HTTP client ─────────────────────────────────────────────────────

/// Graph-style mailbox REST client.
pub struct GraphMailClient {
    client: reqwest::Client,
    api_base: String,
}

impl GraphMailClient {
    pub fn new(client: reqwest::Client, api_base: String) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MailGateway for GraphMailClient {
    async fn fetch_unread(&self, token: &str) -> Result<Vec<InboundMessage>, MailError> {
        let url = format!(
            "{}/me/messages?$filter=isRead eq false&$top=50",
            self.api_base
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| MailError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Fetch(format!("HTTP {status}: {body}")));
        }

        let list: MessageListResponse = response
            .json()
            .await
            .map_err(|e| MailError::Fetch(format!("malformed message list: {e}")))?;

        debug!(count = list.value.len(), "Fetched unread messages");
        Ok(list.value.into_iter().map(InboundMessage::from).collect())
    }

    async fn mark_read(&self, token: &str, message_id: &str) -> Result<(), MailError> {
        let url = format!("{}/me/messages/{}", self.api_base, message_id);

        let response = self
            .client
            .patch(&url)
            .bearer_auth(token)
            .json(&json!({ "isRead": true }))
            .send()
            .await
            .map_err(|e| MailError::MarkRead {
                message_id: message_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::MarkRead {
                message_id: message_id.to_string(),
                reason: format!("HTTP {status}"),
            });
        }
        Ok(())
    }

    async fn send(
        &self,
        token: &str,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError> {
        let url = format!("{}/me/sendMail", self.api_base);
        let payload = json!({
            "message": {
                "subject": subject,
                "body": { "contentType": "HTML", "content": html_body },
                "toRecipients": [
                    { "emailAddress": { "address": to } }
                ]
            }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::Send {
                to: to.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Send {
                to: to.to_string(),
                reason: format!("HTTP {status}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_resource_maps_to_inbound_message() {
        let raw = r#"{
            "value": [{
                "id": "msg-1",
                "subject": "VPN down",
                "from": { "emailAddress": { "address": "a@x.com" } },
                "body": { "content": "<p>Cannot connect since 9am</p>" },
                "conversationId": "conv-1",
                "hasAttachments": true
            }]
        }"#;

        let list: MessageListResponse = serde_json::from_str(raw).unwrap();
        let msg: InboundMessage = list.value.into_iter().next().unwrap().into();

        assert_eq!(msg.id, "msg-1");
        assert_eq!(msg.sender, "a@x.com");
        assert_eq!(msg.subject, "VPN down");
        assert_eq!(msg.conversation_id, "conv-1");
        assert!(msg.has_attachments);
    }

    #[test]
    fn missing_subject_and_attachments_default() {
        let raw = r#"{
            "id": "msg-2",
            "from": { "emailAddress": { "address": "b@x.com" } },
            "body": { "content": "hi" },
            "conversationId": "conv-2"
        }"#;
        let msg: InboundMessage = serde_json::from_str::<MessageResource>(raw).unwrap().into();
        assert_eq!(msg.subject, "");
        assert!(!msg.has_attachments);
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let client = GraphMailClient::new(reqwest::Client::new(), "http://mail.test/v1/".into());
        assert_eq!(client.api_base, "http://mail.test/v1");
    }
}
