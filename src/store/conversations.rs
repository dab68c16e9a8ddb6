//! `ConversationStore` trait and the record it persists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// Durable mapping from a mail-provider conversation id to the case it
/// opened. Created exactly once, on the first message of a new case;
/// immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub case_id: String,
    pub requester: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic store for conversation records.
///
/// Every mutation must be visible to subsequent reads in the same
/// process; no write-behind caching.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Look up the record for a conversation id.
    async fn find(&self, conversation_id: &str) -> Result<Option<ConversationRecord>, StoreError>;

    /// Create the record for a conversation id.
    ///
    /// Fails with `StoreError::Conflict` if a record already exists —
    /// a second create would silently repoint an existing case.
    async fn create(
        &self,
        conversation_id: &str,
        case_id: &str,
        requester: &str,
        subject: &str,
    ) -> Result<ConversationRecord, StoreError>;

    /// Administrative wipe of every record.
    async fn clear_all(&self) -> Result<(), StoreError>;

    /// Number of tracked conversations.
    async fn count(&self) -> Result<u64, StoreError>;
}
