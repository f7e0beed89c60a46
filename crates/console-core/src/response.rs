//! Transport response handling.

use std::collections::HashMap;

/// A response as returned by the transport, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The response headers.
    pub headers: HashMap<String, String>,
    /// The decoded body. Non-JSON bodies arrive as a JSON string, empty bodies as null.
    pub body: serde_json::Value,
}

impl RawResponse {
    /// Create a new response.
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    /// Attach a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Check if the response was successful (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = RawResponse::new(200, serde_json::Value::Null)
            .with_header("X-Request-Id", "r-1");
        assert_eq!(resp.header("x-request-id"), Some("r-1"));
        assert_eq!(resp.header("missing"), None);
    }

    #[test]
    fn test_is_success() {
        assert!(RawResponse::new(204, serde_json::Value::Null).is_success());
        assert!(!RawResponse::new(401, serde_json::Value::Null).is_success());
    }
}
