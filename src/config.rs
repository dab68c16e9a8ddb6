//! Configuration types, built from environment variables.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Which authenticator strategy to construct at startup.
///
/// This is a deployment-time choice: callers of `SessionManager` never
/// branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Username/password JSON exchange against `auth_url`.
    Password,
    /// OAuth device-code flow with token-endpoint polling.
    DeviceCode,
}

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Authenticator strategy.
    pub auth_mode: AuthMode,
    /// Login endpoint for the password flow.
    pub auth_url: String,
    /// Token TTL for password-style logins (device-code uses the
    /// provider-supplied expiry).
    pub token_ttl: Duration,
    /// Ticket backend: draft creation endpoint.
    pub ticket_create_url: String,
    /// Ticket backend: submit endpoint.
    pub ticket_submit_url: String,
    /// Ticket backend: comment endpoint.
    pub ticket_comment_url: String,
    /// Ticket backend: questionnaire submission endpoint.
    pub questionnaire_submit_url: String,
    /// Mailbox REST base URL.
    pub mail_api_base: String,
    /// Identity whose mailbox is polled (also used as the mailbox
    /// session key).
    pub mailbox_identity: String,
    /// Classifier API key, if classification is enabled.
    pub classifier_api_key: Option<SecretString>,
    /// Classifier model name.
    pub classifier_model: String,
    /// Slack bot token, if notifications are enabled.
    pub slack_token: Option<SecretString>,
    /// Slack channel for case notifications.
    pub slack_channel: String,
    /// Poll interval between scheduler ticks.
    pub poll_interval: Duration,
    /// Cooldown after a tick fails even after a token refresh.
    pub failure_cooldown: Duration,
    /// Per-request HTTP timeout for all remote calls.
    pub request_timeout: Duration,
}

impl BotConfig {
    /// Build config from environment variables.
    ///
    /// Endpoints are required; tunables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let auth_mode = match std::env::var("MAILDESK_AUTH_MODE").as_deref() {
            Ok("device_code") => AuthMode::DeviceCode,
            Ok("password") | Err(_) => AuthMode::Password,
            Ok(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "MAILDESK_AUTH_MODE".into(),
                    message: format!("expected 'password' or 'device_code', got '{other}'"),
                });
            }
        };

        let require = |key: &str| {
            std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
        };

        let auth_url = require("MAILDESK_AUTH_URL")?;
        let ticket_create_url = require("MAILDESK_TICKET_CREATE_URL")?;
        let ticket_submit_url = require("MAILDESK_TICKET_SUBMIT_URL")?;
        let ticket_comment_url = require("MAILDESK_TICKET_COMMENT_URL")?;
        let questionnaire_submit_url = require("MAILDESK_QUESTIONNAIRE_SUBMIT_URL")?;
        let mail_api_base = require("MAILDESK_MAIL_API_BASE")?;
        let mailbox_identity = require("MAILDESK_MAILBOX_IDENTITY")?;

        let token_ttl_secs: u64 = std::env::var("MAILDESK_TOKEN_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(24 * 60 * 60);

        let poll_interval_secs: u64 = std::env::var("MAILDESK_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let cooldown_secs: u64 = std::env::var("MAILDESK_FAILURE_COOLDOWN_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        let request_timeout_secs: u64 = std::env::var("MAILDESK_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let classifier_api_key = std::env::var("MAILDESK_CLASSIFIER_API_KEY")
            .ok()
            .map(SecretString::from);

        let classifier_model = std::env::var("MAILDESK_CLASSIFIER_MODEL")
            .unwrap_or_else(|_| "claude-3-haiku-20240307".to_string());

        let slack_token = std::env::var("SLACK_BOT_TOKEN").ok().map(SecretString::from);

        let slack_channel = std::env::var("MAILDESK_SLACK_CHANNEL")
            .unwrap_or_else(|_| "#service-requests".to_string());

        Ok(Self {
            auth_mode,
            auth_url,
            token_ttl: Duration::from_secs(token_ttl_secs),
            ticket_create_url,
            ticket_submit_url,
            ticket_comment_url,
            questionnaire_submit_url,
            mail_api_base,
            mailbox_identity,
            classifier_api_key,
            classifier_model,
            slack_token,
            slack_channel,
            poll_interval: Duration::from_secs(poll_interval_secs),
            failure_cooldown: Duration::from_secs(cooldown_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}
