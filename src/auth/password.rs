//! Password authenticator — one JSON login exchange per refresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::credentials::CredentialStore;
use crate::auth::session::{Authenticator, IssuedToken};
use crate::error::AuthError;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Username/password login against the ticket backend's auth endpoint.
///
/// The issued token's TTL is a policy constant supplied at construction,
/// not something the backend reports.
pub struct PasswordAuthenticator {
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
    auth_url: String,
    token_ttl: Duration,
}

impl PasswordAuthenticator {
    pub fn new(
        client: reqwest::Client,
        credentials: Arc<CredentialStore>,
        auth_url: String,
        token_ttl: Duration,
    ) -> Self {
        Self {
            client,
            credentials,
            auth_url,
            token_ttl,
        }
    }
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn authenticate(&self, identity: &str) -> Result<IssuedToken, AuthError> {
        let credential =
            self.credentials
                .lookup(identity)
                .ok_or_else(|| AuthError::NoCredential {
                    identity: identity.to_string(),
                })?;

        debug!(identity = %identity, url = %self.auth_url, "Performing login exchange");

        let response = self
            .client
            .post(&self.auth_url)
            .json(&LoginRequest {
                username: &credential.username,
                password: credential.secret.expose_secret(),
            })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RemoteRejected {
                reason: format!("HTTP {status}: {body}"),
            });
        }

        let login: LoginResponse = response.json().await.map_err(|e| {
            AuthError::RemoteRejected {
                reason: format!("malformed login response: {e}"),
            }
        })?;

        if login.token.is_empty() {
            return Err(AuthError::RemoteRejected {
                reason: "login response carried an empty token".into(),
            });
        }

        info!(identity = %identity, "Login exchange succeeded");
        Ok(IssuedToken {
            token: login.token,
            ttl: self.token_ttl,
        })
    }
}

/// Map reqwest transport failures onto the auth error taxonomy.
pub(crate) fn map_transport_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::NetworkUnavailable {
            reason: e.to_string(),
        }
    }
}
