//! The credential provider contract.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::AuthError;
use crate::token::{SessionTokens, TokenStore};

/// Source of the bearer credential.
///
/// `refresh_token` must make the new credential visible through `token`
/// before it returns. The guardian never calls it concurrently.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current credential, if signed in.
    fn token(&self) -> Option<String>;

    /// Obtain a new credential.
    async fn refresh_token(&self) -> Result<String, AuthError>;

    /// Terminal notification: the session cannot be recovered.
    fn on_token_expired(&self);
}

/// Refresh callback for `StaticCredentials`.
pub type RefreshFn = Arc<dyn Fn() -> BoxFuture<'static, Result<String, AuthError>> + Send + Sync>;

/// Provider backed by a token store and an optional refresh callback.
///
/// Without a callback, every refresh fails with `MissingRefreshToken`.
pub struct StaticCredentials {
    store: TokenStore,
    refresh: Option<RefreshFn>,
    expired: AtomicUsize,
}

impl StaticCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            store: TokenStore::new(Some(SessionTokens::new(access_token))),
            refresh: None,
            expired: AtomicUsize::new(0),
        }
    }

    /// Provider with no credential at all.
    pub fn anonymous() -> Self {
        Self {
            store: TokenStore::default(),
            refresh: None,
            expired: AtomicUsize::new(0),
        }
    }

    /// Set the refresh callback.
    pub fn with_refresh<F, Fut>(mut self, refresh: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, AuthError>> + Send + 'static,
    {
        let callback: RefreshFn =
            Arc::new(move || Box::pin(refresh()) as BoxFuture<'static, Result<String, AuthError>>);
        self.refresh = Some(callback);
        self
    }

    /// Number of terminal expiry notifications received.
    pub fn expired_count(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.store.access_token()
    }

    async fn refresh_token(&self) -> Result<String, AuthError> {
        let refresh = self.refresh.as_ref().ok_or(AuthError::MissingRefreshToken)?;
        let token = refresh().await?;
        self.store.rotate(token.clone(), None);
        Ok(token)
    }

    fn on_token_expired(&self) {
        self.expired.fetch_add(1, Ordering::SeqCst);
        self.store.clear();
    }
}
