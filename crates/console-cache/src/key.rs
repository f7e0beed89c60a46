//! Cache key composition.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use console_core::{ApiRequest, Method};
use serde_json::Value;

/// Identifies a cacheable call by its structure, not by reference.
///
/// Two keys are equal when method, path, body and query are deeply equal.
/// Object members in the body compare regardless of their order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    method: Method,
    path: String,
    body: Option<String>,
    query: BTreeMap<String, String>,
}

impl CacheKey {
    /// Create a cache key from its parts.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        body: Option<&Value>,
        query: &BTreeMap<String, String>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            body: body.map(canonical_json),
            query: query.clone(),
        }
    }

    /// Key for a request. Headers and timeout are not part of the key.
    pub fn from_request(request: &ApiRequest) -> Self {
        Self::new(
            request.method,
            request.path.clone(),
            request.body.as_ref(),
            &request.query,
        )
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        if !self.query.is_empty() {
            let query: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "?{}", query.join("&"))?;
        }
        if let Some(body) = &self.body {
            write!(f, " {}", body)?;
        }
        Ok(())
    }
}

/// Serialize with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(&String, &Value)> = map.iter().collect();
            members.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in members.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{}", scalar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_member_order_is_irrelevant() {
        let query = BTreeMap::new();
        let a = CacheKey::new(
            Method::Post,
            "/policy/query",
            Some(&json!({"a": 1, "b": {"x": true, "y": [1, 2]}})),
            &query,
        );
        let b = CacheKey::new(
            Method::Post,
            "/policy/query",
            Some(&json!({"b": {"y": [1, 2], "x": true}, "a": 1})),
            &query,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_array_order_matters() {
        let query = BTreeMap::new();
        let a = CacheKey::new(Method::Post, "/p", Some(&json!([1, 2])), &query);
        let b = CacheKey::new(Method::Post, "/p", Some(&json!([2, 1])), &query);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_request_ignores_headers() {
        let a = ApiRequest::get("/config/password-policy").query("scope", "global");
        let b = a.bearer_auth("t1");
        assert_eq!(CacheKey::from_request(&a), CacheKey::from_request(&b));
    }

    #[test]
    fn test_method_and_query_distinguish_keys() {
        let get = CacheKey::from_request(&ApiRequest::get("/roles"));
        let post = CacheKey::from_request(&ApiRequest::post("/roles"));
        let paged = CacheKey::from_request(&ApiRequest::get("/roles").query("page", 2));
        assert_ne!(get, post);
        assert_ne!(get, paged);
    }

    #[test]
    fn test_display() {
        let key = CacheKey::from_request(
            &ApiRequest::post("/roles/search")
                .query("page", 1)
                .body(json!({"name": "admin"})),
        );
        assert_eq!(key.to_string(), r#"POST /roles/search?page=1 {"name":"admin"}"#);
    }
}
