//! Ticket backend client — draft creation, submission, comments, and
//! questionnaire answers against the service-request REST API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::clients::classifier::Classification;
use crate::error::TicketError;

/// Narrow ticket-backend contract consumed by the engine.
#[async_trait]
pub trait TicketClient: Send + Sync {
    /// Create a draft case from classification fields; returns the
    /// backend-assigned case id.
    async fn create_draft(
        &self,
        fields: &Classification,
        requester: &str,
        token: &str,
    ) -> Result<String, TicketError>;

    /// Promote a draft case to submitted.
    async fn submit(&self, case_id: &str, token: &str) -> Result<(), TicketError>;

    /// Append a comment to an existing case.
    async fn comment(&self, case_id: &str, text: &str, token: &str) -> Result<(), TicketError>;

    /// Submit parsed questionnaire answers for a case.
    async fn submit_questionnaire(
        &self,
        case_id: &str,
        answers: &BTreeMap<u32, String>,
        token: &str,
    ) -> Result<(), TicketError>;
}

// ── Backend code tables ─────────────────────────────────────────────

/// Backend category code for a category name. Unknown names default to
/// the IT Support bucket, matching backend expectations.
pub fn category_code(category: &str) -> u32 {
    match category {
        "IT Support" | "Hardware Issue" => 61,
        "Software Issue" => 62,
        "Network Issue" => 63,
        "HR" => 64,
        "Facilities" => 65,
        "Finance" => 66,
        "General" => 67,
        _ => 61,
    }
}

/// Backend type code for a type name.
pub fn type_code(kind: &str) -> u32 {
    match kind {
        "Hardware Issue" => 108,
        "Software Issue" => 109,
        "Network Issue" => 110,
        "Access Request" => 111,
        "Password Reset" => 112,
        "Email Issue" => 113,
        "Printer Issue" => 114,
        "General Request" => 115,
        _ => 108,
    }
}

/// Backend priority id for a priority name. Unknown names map to Medium.
pub fn priority_id(priority: &str) -> u32 {
    match priority {
        "Low" => 1,
        "Medium" => 2,
        "High" => 3,
        _ => 2,
    }
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftResponse {
    service_request: DraftServiceRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftServiceRequest {
    service_request_id: Option<String>,
}

// ── HTTP client ─────────────────────────────────────────────────────

/// Endpoints for the ticket backend.
#[derive(Debug, Clone)]
pub struct TicketEndpoints {
    pub create_url: String,
    pub submit_url: String,
    pub comment_url: String,
    pub questionnaire_url: String,
}

/// REST client for the ticket backend. Authentication is a session
/// cookie token supplied per call by the engine.
pub struct HttpTicketClient {
    client: reqwest::Client,
    endpoints: TicketEndpoints,
}

impl HttpTicketClient {
    pub fn new(client: reqwest::Client, endpoints: TicketEndpoints) -> Self {
        Self { client, endpoints }
    }

    fn cookie_header(token: &str) -> String {
        format!("Cookie_Token={token}")
    }
}

#[async_trait]
impl TicketClient for HttpTicketClient {
    async fn create_draft(
        &self,
        fields: &Classification,
        requester: &str,
        token: &str,
    ) -> Result<String, TicketError> {
        let category_code = category_code(&fields.category);
        let type_code = type_code(&fields.kind);
        let priority_id = priority_id(&fields.priority);

        let payload = json!({
            "serviceRequest": {
                "serviceRequestId": null,
                "statusCode": 1,
                "subject": fields.subject,
                "description": format!("<p>{}</p>", fields.description),
                "categoryCode": category_code.to_string(),
                "serviceRequestCategoryData": {
                    "categoryCode": category_code.to_string(),
                    "description": fields.category,
                    "isActive": true
                },
                "typeCode": type_code.to_string(),
                "serviceRequestType": {
                    "typeCode": type_code.to_string(),
                    "description": fields.kind,
                    "categoryCode": category_code.to_string(),
                    "isActive": true
                },
                "priorityId": priority_id,
                "serviceRequestPriority": {
                    "priorityId": priority_id,
                    "description": fields.priority,
                    "isActive": true
                },
                "unit": {
                    "unitName": fields.department,
                    "isActive": true
                },
                "reporterIdentity": requester
            },
            "serviceRequestHistory": null
        });

        debug!(requester = %requester, category = %fields.category, "Creating draft case");

        let response = self
            .client
            .post(&self.endpoints.create_url)
            .header("Cookie", Self::cookie_header(token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TicketError::CreateFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TicketError::CreateFailed(format!("HTTP {status}: {body}")));
        }

        let draft: DraftResponse = response
            .json()
            .await
            .map_err(|e| TicketError::CreateFailed(format!("malformed draft response: {e}")))?;

        let case_id = draft
            .service_request
            .service_request_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                TicketError::CreateFailed("no serviceRequestId in draft response".into())
            })?;

        info!(case_id = %case_id, "Draft case created");
        Ok(case_id)
    }

    async fn submit(&self, case_id: &str, token: &str) -> Result<(), TicketError> {
        let payload = json!({
            "serviceRequestId": case_id,
            "serviceRequestComment": null,
            "newAttachments": [],
            "serviceRequestStatus": 1
        });

        let response = self
            .client
            .post(&self.endpoints.submit_url)
            .header("Cookie", Self::cookie_header(token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TicketError::SubmitFailed {
                case_id: case_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TicketError::SubmitFailed {
                case_id: case_id.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        info!(case_id = %case_id, "Case submitted");
        Ok(())
    }

    async fn comment(&self, case_id: &str, text: &str, token: &str) -> Result<(), TicketError> {
        let payload = json!({
            "serviceRequestId": case_id,
            "comment": text,
            "timestamp": Utc::now().timestamp_millis()
        });

        let response = self
            .client
            .post(&self.endpoints.comment_url)
            .header("Cookie", Self::cookie_header(token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TicketError::CommentFailed {
                case_id: case_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TicketError::CommentFailed {
                case_id: case_id.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        info!(case_id = %case_id, "Comment added");
        Ok(())
    }

    async fn submit_questionnaire(
        &self,
        case_id: &str,
        answers: &BTreeMap<u32, String>,
        token: &str,
    ) -> Result<(), TicketError> {
        let answer_map: BTreeMap<String, &str> = answers
            .iter()
            .map(|(n, a)| (format!("question_{n}"), a.as_str()))
            .collect();

        let payload = json!({
            "serviceRequestId": case_id,
            "answers": answer_map,
            "submittedAt": Utc::now().timestamp_millis()
        });

        let response = self
            .client
            .post(&self.endpoints.questionnaire_url)
            .header("Cookie", Self::cookie_header(token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TicketError::QuestionnaireFailed {
                case_id: case_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TicketError::QuestionnaireFailed {
                case_id: case_id.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        info!(case_id = %case_id, answers = answers.len(), "Questionnaire answers submitted");
        Ok(())
    }
}
