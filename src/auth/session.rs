//! Per-identity session cache with single-flight refresh.
//!
//! `SessionManager` owns the only mutable auth state in the process.
//! Callers ask for a valid token; the silent path is a cache read, the
//! refresh path serializes per identity so an expiry stampede performs
//! exactly one remote login.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::AuthError;

/// A freshly issued token and its lifetime, as reported by the
/// authenticator strategy.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub ttl: Duration,
}

/// Authenticator strategy — one remote login exchange.
///
/// Implementations: password exchange and device-code polling. Which
/// one a `SessionManager` holds is decided at construction.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, identity: &str) -> Result<IssuedToken, AuthError>;
}

/// A cached authentication session for one identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: String,
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session is valid iff it carries a token and has not expired.
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && Utc::now() < self.expires_at
    }
}

/// Token lifecycle manager: acquire, cache, expire, refresh.
///
/// One live session per identity (last write wins). Nothing is
/// persisted across restarts.
pub struct SessionManager {
    authenticator: Arc<dyn Authenticator>,
    sessions: RwLock<HashMap<String, Session>>,
    /// Per-identity refresh guards. The outer mutex only protects the
    /// map of guards, never a remote call.
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            sessions: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return a valid token for the identity, logging in remotely only
    /// if the cached session is absent or expired.
    pub async fn get_valid_token(&self, identity: &str) -> Result<String, AuthError> {
        let key = identity.to_lowercase();

        // Silent path: no remote call.
        if let Some(session) = self.sessions.read().await.get(&key)
            && session.is_valid()
        {
            return Ok(session.token.clone());
        }

        let guard = self.refresh_guard(&key).await;
        let _held = guard.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(session) = self.sessions.read().await.get(&key)
            && session.is_valid()
        {
            debug!(identity = %key, "Session refreshed by concurrent caller");
            return Ok(session.token.clone());
        }

        let issued = self.authenticator.authenticate(identity).await?;
        let now = Utc::now();
        let session = Session {
            identity: key.clone(),
            token: issued.token.clone(),
            issued_at: now,
            expires_at: now
                + chrono::Duration::from_std(issued.ttl).unwrap_or(chrono::Duration::zero()),
        };
        info!(identity = %key, expires_at = %session.expires_at, "Session established");
        self.sessions.write().await.insert(key, session);

        Ok(issued.token)
    }

    /// Drop the cached session for an identity, forcing the next
    /// `get_valid_token` to perform a remote login.
    pub async fn invalidate(&self, identity: &str) {
        let key = identity.to_lowercase();
        if self.sessions.write().await.remove(&key).is_some() {
            info!(identity = %key, "Session invalidated");
        }
    }

    /// Whether a valid cached session exists for the identity.
    pub async fn has_valid_session(&self, identity: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(&identity.to_lowercase())
            .is_some_and(Session::is_valid)
    }

    async fn refresh_guard(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
