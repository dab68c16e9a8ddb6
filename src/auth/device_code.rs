//! Device-code authenticator — code issuance plus token-endpoint polling.
//!
//! Used for mailbox-provider OAuth where no password is on file: the
//! flow prints a verification URI and user code, then polls until the
//! user completes sign-in, declines, or the code expires.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::password::map_transport_error;
use crate::auth::session::{Authenticator, IssuedToken};
use crate::error::{AuthError, ConfigError};

/// Endpoints and client identity for the device-code flow.
#[derive(Debug, Clone)]
pub struct DeviceCodeConfig {
    pub device_code_url: String,
    pub token_url: String,
    pub client_id: String,
    pub scope: String,
}

impl DeviceCodeConfig {
    /// Build from environment; only consulted when the device-code
    /// auth mode is selected.
    pub fn from_env() -> Result<Self, ConfigError> {
        let require = |key: &str| {
            std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
        };
        Ok(Self {
            device_code_url: require("MAILDESK_DEVICE_CODE_URL")?,
            token_url: require("MAILDESK_TOKEN_URL")?,
            client_id: require("MAILDESK_CLIENT_ID")?,
            scope: std::env::var("MAILDESK_SCOPE")
                .unwrap_or_else(|_| "https://graph.microsoft.com/.default".to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    /// Polling interval in seconds.
    interval: u64,
    /// Code lifetime in seconds.
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
}

/// Outcome of one token poll that did not yield a token.
#[derive(Debug, PartialEq, Eq)]
enum PollStep {
    /// User has not completed sign-in yet.
    Pending,
    /// Provider asked us to poll less often.
    SlowDown,
    /// Terminal failure.
    Declined,
    Expired,
    Rejected(String),
}

fn classify_token_error(error: &str) -> PollStep {
    match error {
        "authorization_pending" => PollStep::Pending,
        "slow_down" => PollStep::SlowDown,
        "authorization_declined" => PollStep::Declined,
        "expired_token" => PollStep::Expired,
        other => PollStep::Rejected(other.to_string()),
    }
}

/// Device-code polling authenticator.
pub struct DeviceCodeAuthenticator {
    client: reqwest::Client,
    config: DeviceCodeConfig,
}

impl DeviceCodeAuthenticator {
    pub fn new(client: reqwest::Client, config: DeviceCodeConfig) -> Self {
        Self { client, config }
    }

    async fn request_device_code(&self) -> Result<DeviceCodeResponse, AuthError> {
        let response = self
            .client
            .post(&self.config.device_code_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("scope", self.config.scope.as_str()),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RemoteRejected {
                reason: format!("device code request failed: HTTP {status}: {body}"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::RemoteRejected {
                reason: format!("malformed device code response: {e}"),
            })
    }

    async fn poll_token(&self, device_code: &str) -> Result<Result<TokenResponse, PollStep>, AuthError> {
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", self.config.client_id.as_str()),
                ("device_code", device_code),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            let token = response
                .json()
                .await
                .map_err(|e| AuthError::RemoteRejected {
                    reason: format!("malformed token response: {e}"),
                })?;
            return Ok(Ok(token));
        }

        let body = response.text().await.unwrap_or_default();
        let error: TokenErrorResponse =
            serde_json::from_str(&body).map_err(|_| AuthError::RemoteRejected {
                reason: format!("token poll failed: HTTP {status}: {body}"),
            })?;

        Ok(Err(classify_token_error(&error.error)))
    }
}

#[async_trait]
impl Authenticator for DeviceCodeAuthenticator {
    async fn authenticate(&self, identity: &str) -> Result<IssuedToken, AuthError> {
        let issued = self.request_device_code().await?;

        warn!(
            identity = %identity,
            verification_uri = %issued.verification_uri,
            user_code = %issued.user_code,
            "Device-code sign-in required; complete verification in a browser"
        );

        let deadline = Instant::now() + Duration::from_secs(issued.expires_in);
        let mut interval = Duration::from_secs(issued.interval.max(1));

        while Instant::now() < deadline {
            tokio::time::sleep(interval).await;

            match self.poll_token(&issued.device_code).await? {
                Ok(token) => {
                    info!(identity = %identity, "Device-code authentication completed");
                    return Ok(IssuedToken {
                        token: token.access_token,
                        ttl: Duration::from_secs(token.expires_in),
                    });
                }
                Err(PollStep::Pending) => {
                    debug!("Authorization pending, continuing to poll");
                }
                Err(PollStep::SlowDown) => {
                    interval += Duration::from_secs(5);
                    debug!(interval_secs = interval.as_secs(), "Provider requested slower polling");
                }
                Err(PollStep::Declined) => return Err(AuthError::Declined),
                Err(PollStep::Expired) => return Err(AuthError::CodeExpired),
                Err(PollStep::Rejected(reason)) => {
                    return Err(AuthError::RemoteRejected { reason });
                }
            }
        }

        Err(AuthError::CodeExpired)
    }
}
