//! Session token bookkeeping.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The access/refresh pair for one signed-in session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Bearer credential sent with every call.
    pub access_token: String,
    /// Credential exchanged for a new access token.
    pub refresh_token: Option<String>,
    /// When the access token was obtained.
    pub issued_at: DateTime<Utc>,
}

impl SessionTokens {
    /// Create tokens issued now.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            issued_at: Utc::now(),
        }
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Produce the successor after a refresh.
    ///
    /// Services that do not rotate refresh tokens omit it; the old one is kept.
    pub fn rotate(&self, access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            issued_at: Utc::now(),
        }
    }

    /// Age of the access token in seconds.
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.issued_at).num_seconds().max(0)
    }
}

/// Shared holder for the current session tokens.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: RwLock<Option<SessionTokens>>,
}

impl TokenStore {
    pub fn new(tokens: Option<SessionTokens>) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }

    /// Current access token.
    pub fn access_token(&self) -> Option<String> {
        self.read().as_ref().map(|t| t.access_token.clone())
    }

    /// Current refresh token.
    pub fn refresh_token(&self) -> Option<String> {
        self.read().as_ref().and_then(|t| t.refresh_token.clone())
    }

    pub fn get(&self) -> Option<SessionTokens> {
        self.read().clone()
    }

    /// Replace the access token, keeping the refresh token unless a new one is given.
    pub fn rotate(&self, access_token: impl Into<String>, refresh_token: Option<String>) {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let next = match tokens.as_ref() {
            Some(current) => current.rotate(access_token, refresh_token),
            None => SessionTokens {
                access_token: access_token.into(),
                refresh_token,
                issued_at: Utc::now(),
            },
        };
        *tokens = Some(next);
    }

    /// Forget the session.
    pub fn clear(&self) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<SessionTokens>> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_keeps_refresh_token_when_not_rotated() {
        let tokens = SessionTokens::new("a1").with_refresh_token("r1");
        let next = tokens.rotate("a2", None);
        assert_eq!(next.access_token, "a2");
        assert_eq!(next.refresh_token.as_deref(), Some("r1"));

        let rotated = tokens.rotate("a3", Some("r2".into()));
        assert_eq!(rotated.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn test_store_rotate_and_clear() {
        let store = TokenStore::new(Some(SessionTokens::new("a1").with_refresh_token("r1")));
        assert_eq!(store.access_token().as_deref(), Some("a1"));

        store.rotate("a2", None);
        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));

        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_rotate_on_empty_store() {
        let store = TokenStore::default();
        store.rotate("a1", Some("r1".into()));
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    }

    #[test]
    fn test_fresh_token_age() {
        assert!(SessionTokens::new("a").age_secs() < 5);
    }
}
