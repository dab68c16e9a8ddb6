//! Persistence layer — durable conversation → case mapping.

pub mod conversations;
pub mod libsql_backend;

pub use conversations::{ConversationRecord, ConversationStore};
pub use libsql_backend::LibSqlStore;
