//! The composed console client.
//!
//! `send_cached` runs cache → guardian → transport; `send` skips the cache.
//! Every attempt is normalized once, at the point where the transport
//! returns, and server-unavailable results are reported to the notifier.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use console_auth::{CredentialProvider, GuardianConfig, SessionGuardian, StaticCredentials};
use console_cache::{CacheKey, CacheStats, Ttl, TtlCache};
use console_core::{
    normalize, ApiError, ApiRequest, CodeClassifier, ConsoleConfig, ErrorClassifier, Notice,
    NoopNotifier, Notifier, Transport, DEFAULT_TIMEOUT,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::credentials::HttpCredentialProvider;
use crate::error::DataError;
use crate::http::ReqwestTransport;

/// Everything one attempt needs. Shared by cached producers, so it must not
/// own the cache.
struct Pipeline {
    transport: Arc<dyn Transport>,
    classifier: Arc<dyn ErrorClassifier>,
    guardian: SessionGuardian,
    notifier: Arc<dyn Notifier>,
    default_headers: BTreeMap<String, String>,
    timeout: Duration,
}

impl Pipeline {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let request = self.prepare(request);
        self.guardian
            .execute(|token| {
                let attempt = match token {
                    Some(token) => request.bearer_auth(token),
                    None => request.clone(),
                };
                async move { self.attempt(&attempt).await }
            })
            .await
    }

    async fn attempt(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let response = self.transport.call(request).await?;
        let result = normalize(response, self.classifier.as_ref());
        if let Err(ApiError::ServerUnavailable { status, code }) = &result {
            tracing::warn!(path = %request.path, status, %code, "server unavailable");
            self.notifier.notify(Notice::ServerUnavailable {
                path: request.path.clone(),
                status: *status,
                code: code.clone(),
            });
        }
        result
    }

    fn prepare(&self, mut request: ApiRequest) -> ApiRequest {
        for (key, value) in &self.default_headers {
            request
                .headers
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if request.timeout == DEFAULT_TIMEOUT {
            request.timeout = self.timeout;
        }
        request
    }
}

/// Client for the console's backing services. Cheap to clone.
#[derive(Clone)]
pub struct ConsoleClient {
    pipeline: Arc<Pipeline>,
    cache: TtlCache<Value, ApiError>,
    default_ttl: Ttl,
}

impl ConsoleClient {
    /// Start building a client over `transport`.
    pub fn builder(transport: Arc<dyn Transport>) -> ConsoleClientBuilder {
        ConsoleClientBuilder::new(transport)
    }

    /// Build the HTTP client described by `config`.
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, DataError> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::from_config(&config.api)?);
        Ok(Self::builder(transport).config(config).build())
    }

    /// Send through the guardian, uncached.
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.pipeline.send(request).await
    }

    /// Send through the cache with the default lifetime.
    pub async fn send_cached(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.send_cached_for(request, self.default_ttl).await
    }

    /// Send through the cache with an explicit lifetime.
    ///
    /// Identical concurrent calls share one attempt, and a failure stays
    /// cached for the lifetime like a success does.
    pub async fn send_cached_for(&self, request: ApiRequest, ttl: Ttl) -> Result<Value, ApiError> {
        let key = CacheKey::from_request(&request);
        let pipeline = Arc::clone(&self.pipeline);
        self.cache
            .wrap(key, ttl, move || async move { pipeline.send(request).await })
            .await
    }

    /// GET `path` and decode the body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.send(ApiRequest::get(path)).await?;
        serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Drop the cached entry for `request`.
    pub fn invalidate_cache(&self, request: &ApiRequest) -> bool {
        self.cache.invalidate(&CacheKey::from_request(request))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn guardian(&self) -> &SessionGuardian {
        &self.pipeline.guardian
    }

    /// Cancel cache timers and drop cached entries.
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}

/// Builder for `ConsoleClient`.
pub struct ConsoleClientBuilder {
    transport: Arc<dyn Transport>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    classifier: Arc<dyn ErrorClassifier>,
    notifier: Arc<dyn Notifier>,
    guardian: GuardianConfig,
    default_headers: BTreeMap<String, String>,
    timeout: Duration,
    ttl: Ttl,
}

impl ConsoleClientBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            credentials: None,
            classifier: Arc::new(CodeClassifier::default()),
            notifier: Arc::new(NoopNotifier),
            guardian: GuardianConfig::default(),
            default_headers: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            ttl: Ttl::After(Duration::from_secs(60)),
        }
    }

    /// Apply every setting from `config`. Credentials come from the auth
    /// section unless set explicitly.
    pub fn config(mut self, config: &ConsoleConfig) -> Self {
        self.classifier = Arc::new(CodeClassifier::from_config(&config.auth));
        self.guardian = GuardianConfig::from(&config.auth);
        self.timeout = config.api.timeout();
        self.ttl = Ttl::from(config.cache.ttl());
        if self.credentials.is_none() {
            let provider =
                HttpCredentialProvider::from_config(Arc::clone(&self.transport), &config.auth)
                    .with_classifier(Arc::clone(&self.classifier))
                    .with_timeout(self.timeout);
            self.credentials = Some(Arc::new(provider));
        }
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn guardian_config(mut self, config: GuardianConfig) -> Self {
        self.guardian = config;
        self
    }

    pub fn default_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Timeout for requests that do not set their own.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Default cache lifetime for `send_cached`.
    pub fn cache_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.ttl = ttl.into();
        self
    }

    pub fn build(self) -> ConsoleClient {
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(StaticCredentials::anonymous()));
        let guardian = SessionGuardian::new(credentials)
            .with_config(self.guardian)
            .with_notifier(Arc::clone(&self.notifier));

        ConsoleClient {
            pipeline: Arc::new(Pipeline {
                transport: self.transport,
                classifier: self.classifier,
                guardian,
                notifier: self.notifier,
                default_headers: self.default_headers,
                timeout: self.timeout,
            }),
            cache: TtlCache::new(),
            default_ttl: self.ttl,
        }
    }
}
