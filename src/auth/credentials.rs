//! Static credential table — identity → login credentials.
//!
//! Credentials are loaded once at startup and never persisted anywhere
//! else; conversation records carry only the identity string.

use std::collections::HashMap;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Login credentials for one identity.
#[derive(Debug, Clone)]
pub struct Credential {
    /// The requester's address (lowercased lookup key).
    pub identity: String,
    /// Backend login name.
    pub username: String,
    /// Backend login secret.
    pub secret: SecretString,
}

/// Resolves an identity to its stored credentials.
///
/// Lookup is case-insensitive on the identity.
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: HashMap<String, Credential>,
}

impl CredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `MAILDESK_CREDENTIALS` format: comma-separated
    /// `identity:username:password` triples.
    pub fn from_env_string(raw: &str) -> Result<Self, ConfigError> {
        let mut store = Self::new();
        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(identity), Some(username), Some(secret))
                    if !identity.is_empty() && !username.is_empty() && !secret.is_empty() =>
                {
                    store.insert(Credential {
                        identity: identity.to_string(),
                        username: username.to_string(),
                        secret: SecretString::from(secret.to_string()),
                    });
                }
                _ => {
                    return Err(ConfigError::MalformedCredential(entry.to_string()));
                }
            }
        }
        Ok(store)
    }

    /// Register a credential, replacing any previous entry for the
    /// same identity.
    pub fn insert(&mut self, credential: Credential) {
        self.entries
            .insert(credential.identity.to_lowercase(), credential);
    }

    /// Look up the credential for an identity (case-insensitive).
    pub fn lookup(&self, identity: &str) -> Option<&Credential> {
        self.entries.get(&identity.to_lowercase())
    }

    /// Number of registered identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any credentials are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(identity: &str) -> Credential {
        Credential {
            identity: identity.to_string(),
            username: "user".into(),
            secret: SecretString::from("pass"),
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut store = CredentialStore::new();
        store.insert(cred("Alice@Example.COM"));

        assert!(store.lookup("alice@example.com").is_some());
        assert!(store.lookup("ALICE@EXAMPLE.COM").is_some());
        assert!(store.lookup("bob@example.com").is_none());
    }

    #[test]
    fn insert_replaces_existing_identity() {
        let mut store = CredentialStore::new();
        store.insert(cred("a@x.com"));
        store.insert(Credential {
            username: "second".into(),
            ..cred("A@X.COM")
        });

        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("a@x.com").unwrap().username, "second");
    }

    #[test]
    fn parses_env_triples() {
        let store =
            CredentialStore::from_env_string("a@x.com:alice:pw1, b@x.com:bob:pw2").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.lookup("b@x.com").unwrap().username, "bob");
    }

    #[test]
    fn rejects_malformed_entry() {
        let result = CredentialStore::from_env_string("a@x.com:alice");
        assert!(matches!(result, Err(ConfigError::MalformedCredential(_))));
    }

    #[test]
    fn empty_string_yields_empty_store() {
        let store = CredentialStore::from_env_string("").unwrap();
        assert!(store.is_empty());
    }
}
