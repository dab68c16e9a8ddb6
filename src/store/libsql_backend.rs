//! libSQL backend for the conversation store.
//!
//! Local file database (":memory:" in tests). Writes go straight to the
//! database so a crash between a create and the next poll cycle cannot
//! lose the mapping.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::conversations::{ConversationRecord, ConversationStore};

/// libSQL-backed conversation store.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async
/// use; the conversations table's primary key provides the atomic
/// check-then-write for `create`.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("failed to create store directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Conversation store opened");
        Ok(store)
    }

    /// Open an in-memory store (for tests).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS conversations (
                    conversation_id TEXT PRIMARY KEY,
                    case_id TEXT NOT NULL,
                    requester TEXT NOT NULL,
                    subject TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_conversations_case ON conversations(case_id);",
            )
            .await
            .map_err(|e| StoreError::Open(format!("schema initialization failed: {e}")))?;
        Ok(())
    }

    fn parse_created_at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[async_trait]
impl ConversationStore for LibSqlStore {
    async fn find(&self, conversation_id: &str) -> Result<Option<ConversationRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT conversation_id, case_id, requester, subject, created_at
                 FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        else {
            return Ok(None);
        };

        let created_at: String = row.get(4).map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(Some(ConversationRecord {
            conversation_id: row.get(0).map_err(|e| StoreError::Query(e.to_string()))?,
            case_id: row.get(1).map_err(|e| StoreError::Query(e.to_string()))?,
            requester: row.get(2).map_err(|e| StoreError::Query(e.to_string()))?,
            subject: row.get(3).map_err(|e| StoreError::Query(e.to_string()))?,
            created_at: Self::parse_created_at(&created_at),
        }))
    }

    async fn create(
        &self,
        conversation_id: &str,
        case_id: &str,
        requester: &str,
        subject: &str,
    ) -> Result<ConversationRecord, StoreError> {
        let created_at = Utc::now();
        let result = self
            .conn
            .execute(
                "INSERT INTO conversations (conversation_id, case_id, requester, subject, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conversation_id,
                    case_id,
                    requester,
                    subject,
                    created_at.to_rfc3339()
                ],
            )
            .await;

        match result {
            Ok(_) => {
                debug!(
                    conversation_id = %conversation_id,
                    case_id = %case_id,
                    "Conversation mapping persisted"
                );
                Ok(ConversationRecord {
                    conversation_id: conversation_id.to_string(),
                    case_id: case_id.to_string(),
                    requester: requester.to_string(),
                    subject: subject.to_string(),
                    created_at,
                })
            }
            Err(e) if e.to_string().contains("UNIQUE constraint") => {
                let existing_case_id = self
                    .find(conversation_id)
                    .await?
                    .map(|r| r.case_id)
                    .unwrap_or_default();
                Err(StoreError::Conflict {
                    conversation_id: conversation_id.to_string(),
                    existing_case_id,
                })
            }
            Err(e) => Err(StoreError::Query(e.to_string())),
        }
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let cleared = self
            .conn
            .execute("DELETE FROM conversations", ())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        info!(cleared, "Conversation store cleared");
        Ok(())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM conversations", ())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
            .ok_or_else(|| StoreError::Query("COUNT returned no rows".into()))?;
        let n: i64 = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(n.max(0) as u64)
    }
}
