//! Classifier — maps a message's body and subject to structured case
//! fields via a remote text model.
//!
//! Classification is advisory: any failure here is absorbed by the
//! engine with `Classification::fallback`, never surfaced as fatal.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::ClassifyError;

const CLASSIFIER_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 400;

/// Structured case fields derived from one message. Ephemeral — not
/// persisted beyond the creation call that consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Classification {
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub department: String,
    pub priority: String,
    pub subject: String,
    pub description: String,
}

impl Classification {
    /// Fixed fallback fields used whenever the classifier errors or
    /// returns unparsable output.
    pub fn fallback(subject: &str) -> Self {
        Self {
            category: "General".into(),
            kind: "General Request".into(),
            department: "IT".into(),
            priority: "Medium".into(),
            subject: if subject.trim().is_empty() {
                "Email request".into()
            } else {
                subject.trim().to_string()
            },
            description: "Automatic classification unavailable - manual review required".into(),
        }
    }
}

/// Remote text → structured-fields contract.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, body: &str, subject: &str) -> Result<Classification, ClassifyError>;
}

/// Classifier used when no API key is configured: every message gets
/// the fallback fields without a remote call.
pub struct FallbackClassifier;

#[async_trait]
impl Classifier for FallbackClassifier {
    async fn classify(&self, _body: &str, subject: &str) -> Result<Classification, ClassifyError> {
        Ok(Classification::fallback(subject))
    }
}

// ── Response shapes ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: String,
}

// ── HTTP client ─────────────────────────────────────────────────────

/// Claude messages-API classifier.
pub struct ClaudeClassifier {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl ClaudeClassifier {
    pub fn new(client: reqwest::Client, api_key: SecretString, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl Classifier for ClaudeClassifier {
    async fn classify(&self, body: &str, subject: &str) -> Result<Classification, ClassifyError> {
        let prompt = build_classification_prompt(body, subject);

        let request = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [
                { "role": "user", "content": [{ "type": "text", "text": prompt }] }
            ]
        });

        let response = self
            .client
            .post(CLASSIFIER_URL)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifyError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::RequestFailed(format!(
                "HTTP {status}: {body}"
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .content
            .first()
            .map(|b| b.text.as_str())
            .ok_or_else(|| ClassifyError::InvalidResponse("empty content".into()))?;

        debug!(raw = %text, "Classifier raw output");
        parse_classification(text)
    }
}

/// Build the classification prompt with the fixed category/type catalog.
fn build_classification_prompt(body: &str, subject: &str) -> String {
    format!(
        "You are a classification assistant.\n\
         Here are the categories and types available in the system:\n\
         {{\n\
           \"IT Support\": [\"Hardware Issue\", \"Software Issue\", \"Network Issue\", \"Access Request\"],\n\
           \"HR\": [\"Leave Request\", \"Policy Question\", \"Benefits\", \"Training\"],\n\
           \"Finance\": [\"Expense Report\", \"Budget Request\", \"Invoice Query\", \"Payment Issue\"],\n\
           \"Facilities\": [\"Maintenance Request\", \"Room Booking\", \"Equipment Request\", \"Security Issue\"]\n\
         }}\n\n\
         For the following user input, generate a JSON with these exact keys:\n\
         - category\n\
         - type\n\
         - department\n\
         - priority (Low, Medium, or High)\n\
         - subject (concise, max 10 words)\n\
         - description (1-2 clear sentences)\n\n\
         Important:\n\
         - category and type MUST be chosen from the provided list above.\n\
         - department must be relevant to the request (if not sure, default to \"IT Support\").\n\
         - priority: Low = minor/non-urgent, Medium = normal, High = urgent/critical.\n\n\
         Email Subject: {subject}\n\
         Email Content: {body}"
    )
}

/// Parse model output into a `Classification`, tolerating markdown
/// wrapping and surrounding prose.
fn parse_classification(raw: &str) -> Result<Classification, ClassifyError> {
    let json_str = extract_json_object(raw);
    serde_json::from_str(&json_str).map_err(|e| ClassifyError::InvalidResponse(e.to_string()))
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_fields_are_fixed() {
        let c = Classification::fallback("Laptop is slow");
        assert_eq!(c.category, "General");
        assert_eq!(c.priority, "Medium");
        assert_eq!(c.department, "IT");
        assert_eq!(c.subject, "Laptop is slow");
    }

    #[test]
    fn fallback_substitutes_blank_subject() {
        let c = Classification::fallback("   ");
        assert_eq!(c.subject, "Email request");
    }

    #[test]
    fn parses_plain_json_output() {
        let raw = r#"{"category": "IT Support", "type": "Network Issue", "department": "IT Support", "priority": "High", "subject": "VPN outage", "description": "User cannot connect to the VPN."}"#;
        let c = parse_classification(raw).unwrap();
        assert_eq!(c.category, "IT Support");
        assert_eq!(c.kind, "Network Issue");
        assert_eq!(c.priority, "High");
    }

    #[test]
    fn parses_markdown_wrapped_output() {
        let raw = "Here is the classification:\n```json\n{\"category\": \"HR\", \"type\": \"Leave Request\", \"department\": \"HR\", \"priority\": \"Low\", \"subject\": \"Vacation days\", \"description\": \"Asks about remaining leave.\"}\n```";
        let c = parse_classification(raw).unwrap();
        assert_eq!(c.category, "HR");
        assert_eq!(c.kind, "Leave Request");
    }

    #[test]
    fn parses_output_with_surrounding_prose() {
        let raw = "Sure. {\"category\": \"Facilities\", \"type\": \"Maintenance Request\", \"department\": \"Facilities\", \"priority\": \"Medium\", \"subject\": \"Broken chair\", \"description\": \"A chair needs repair.\"} Let me know.";
        let c = parse_classification(raw).unwrap();
        assert_eq!(c.category, "Facilities");
    }

    #[test]
    fn missing_required_field_is_invalid() {
        let raw = r#"{"category": "IT Support", "priority": "High"}"#;
        assert!(matches!(
            parse_classification(raw),
            Err(ClassifyError::InvalidResponse(_))
        ));
    }

    #[test]
    fn non_json_output_is_invalid() {
        assert!(parse_classification("I cannot classify this.").is_err());
    }

    #[test]
    fn prompt_carries_subject_and_content() {
        let prompt = build_classification_prompt("body text", "subject line");
        assert!(prompt.contains("Email Subject: subject line"));
        assert!(prompt.contains("Email Content: body text"));
        assert!(prompt.contains("IT Support"));
    }
}
