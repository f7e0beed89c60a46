//! HTTP transport adapter over reqwest.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use console_core::{ApiConfig, ApiRequest, RawResponse, Transport, TransportFailure};
use serde_json::Value;

use crate::error::DataError;

/// Performs one HTTP call per `call`.
///
/// Never retries and never looks at the body beyond decoding it.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    default_headers: BTreeMap<String, String>,
}

impl ReqwestTransport {
    /// Create a transport for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_headers: BTreeMap::new(),
        })
    }

    /// Create from the api section of the configuration.
    pub fn from_config(config: &ApiConfig) -> Result<Self, DataError> {
        let mut transport = Self::new(config.base_url.clone())?;
        transport.default_headers = config.default_headers.clone();
        Ok(transport)
    }

    /// Add a header sent with every call. Request headers take precedence.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn call(&self, request: &ApiRequest) -> Result<RawResponse, TransportFailure> {
        let url = request.url(&self.base_url);
        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &self.default_headers {
            if !request.headers.contains_key(key) {
                builder = builder.header(key, value);
            }
        }
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::trace!(method = %request.method, %url, "sending request");
        let response = builder
            .send()
            .await
            .map_err(|e| map_error(e, request.timeout))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_error(e, request.timeout))?;

        Ok(RawResponse {
            status,
            headers,
            body: decode_body(&bytes),
        })
    }
}

fn map_error(err: reqwest::Error, timeout: Duration) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::Timeout { after: timeout }
    } else if err.is_connect() {
        TransportFailure::Offline
    } else {
        TransportFailure::Aborted(err.to_string())
    }
}

/// Empty bodies become null, non-JSON bodies a JSON string.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
