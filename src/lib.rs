//! maildesk — mailbox-to-service-request correlation bot.
//!
//! Polls a shared mailbox, correlates each message to a service
//! request by conversation id, and drives the case lifecycle: create
//! on first contact, comment on follow-ups, submit questionnaire
//! answers when a reply carries them.

pub mod auth;
pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod store;
