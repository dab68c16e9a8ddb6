//! Conversation-correlation engine.
//!
//! Every inbound message runs one terminal pass:
//! received → new-case | follow-up | questionnaire-response → done | failed.

pub mod content;
pub mod correlation;

pub use correlation::{CorrelationEngine, Disposition};
