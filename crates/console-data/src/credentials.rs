//! Refresh-token exchange over the transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use console_auth::{AuthError, CredentialProvider, SessionTokens, TokenStore};
use console_core::{
    normalize, ApiRequest, AuthConfig, CodeClassifier, ErrorClassifier, Transport, DEFAULT_TIMEOUT,
};
use serde_json::{json, Value};

/// Credential provider that POSTs the refresh token to the backing service.
///
/// The refresh call goes straight to the transport. Routing it through the
/// guardian would make a rejected refresh wait on itself.
pub struct HttpCredentialProvider {
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn ErrorClassifier>,
    refresh_path: String,
    timeout: Duration,
    store: TokenStore,
}

impl HttpCredentialProvider {
    pub fn new(transport: Arc<dyn Transport>, refresh_path: impl Into<String>) -> Self {
        Self {
            transport,
            classifier: Arc::new(CodeClassifier::default()),
            refresh_path: refresh_path.into(),
            timeout: DEFAULT_TIMEOUT,
            store: TokenStore::default(),
        }
    }

    /// Create from the auth section, seeding the store with configured tokens.
    pub fn from_config(transport: Arc<dyn Transport>, config: &AuthConfig) -> Self {
        let provider = Self::new(transport, config.refresh_path.clone())
            .with_classifier(Arc::new(CodeClassifier::from_config(config)));
        if let Some(access_token) = &config.access_token {
            let mut tokens = SessionTokens::new(access_token.clone());
            tokens.refresh_token = config.refresh_token.clone();
            return provider.with_tokens(tokens);
        }
        provider
    }

    pub fn with_tokens(self, tokens: SessionTokens) -> Self {
        Self {
            store: TokenStore::new(Some(tokens)),
            ..self
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }
}

#[async_trait]
impl CredentialProvider for HttpCredentialProvider {
    fn token(&self) -> Option<String> {
        self.store.access_token()
    }

    async fn refresh_token(&self) -> Result<String, AuthError> {
        let refresh_token = self
            .store
            .refresh_token()
            .ok_or(AuthError::MissingRefreshToken)?;
        let request = ApiRequest::post(self.refresh_path.clone())
            .body(json!({ "refreshToken": refresh_token }))
            .timeout(self.timeout);

        let response = self
            .transport
            .call(&request)
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let body = normalize(response, self.classifier.as_ref())
            .map_err(|e| AuthError::RefreshRejected(e.to_string()))?;

        let (access_token, rotated) = read_tokens(&body)?;
        self.store.rotate(access_token.clone(), rotated);
        tracing::debug!(path = %self.refresh_path, "access token rotated");
        Ok(access_token)
    }

    fn on_token_expired(&self) {
        tracing::warn!("session expired, credentials cleared");
        self.store.clear();
    }
}

/// Pull the access token and optional rotated refresh token out of a body,
/// unwrapping a `data` envelope if present.
fn read_tokens(body: &Value) -> Result<(String, Option<String>), AuthError> {
    let payload = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
    let access_token = ["accessToken", "token"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .ok_or_else(|| AuthError::InvalidResponse("no access token in refresh response".into()))?;
    let refresh_token = payload
        .get("refreshToken")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((access_token.to_string(), refresh_token))
}
