//! Normalization of response error codes into `ErrorKind`.

use std::collections::HashSet;

use http::StatusCode;
use serde_json::Value;

use crate::error::{ApiError, ErrorKind};
use crate::response::RawResponse;

/// Maps a response to its error classification.
pub trait ErrorClassifier: Send + Sync {
    /// Returns `None` for a successful response. `detail` is the body's
    /// error detail, extracted once by the caller.
    fn classify(&self, response: &RawResponse, detail: &ErrorDetail) -> Option<ErrorKind>;
}

/// Error code and message pulled out of a response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
    /// The body is an error envelope: it carries an `error` member or an
    /// `errID`. A bare `code` may be a domain field.
    pub envelope: bool,
}

impl ErrorDetail {
    /// Extract the error code from the shapes backing services use.
    ///
    /// Looks at `code`, `errID`, `error.code`, `error.errID` in that order.
    pub fn from_body(body: &Value) -> Self {
        let nested = body.get("error");
        let code = ["code", "errID"]
            .iter()
            .find_map(|field| body.get(*field).and_then(code_text))
            .or_else(|| {
                nested.and_then(|err| {
                    ["code", "errID"]
                        .iter()
                        .find_map(|field| err.get(*field).and_then(code_text))
                })
            });

        let message = ["message", "msg"]
            .iter()
            .find_map(|field| body.get(*field).and_then(Value::as_str))
            .or_else(|| {
                nested.and_then(|err| {
                    err.get("message")
                        .and_then(Value::as_str)
                        .or_else(|| err.as_str())
                })
            })
            .map(str::to_string);
        let envelope = nested.is_some_and(|err| !err.is_null()) || body.get("errID").is_some();

        Self {
            code,
            message,
            envelope,
        }
    }
}

fn code_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Codes that mean "success" when a service always replies 200.
const SUCCESS_CODES: &[&str] = &["0", "200", "OK", "SUCCESS"];

/// Table-driven classifier over status codes and body error codes.
#[derive(Debug, Clone)]
pub struct CodeClassifier {
    auth_expired: HashSet<String>,
    unavailable: HashSet<String>,
}

impl CodeClassifier {
    /// Create a classifier with the given code tables.
    pub fn new(
        auth_expired: impl IntoIterator<Item = impl Into<String>>,
        unavailable: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            auth_expired: auth_expired.into_iter().map(Into::into).collect(),
            unavailable: unavailable.into_iter().map(Into::into).collect(),
        }
    }

    /// Create from the auth section of the configuration.
    pub fn from_config(config: &crate::config::AuthConfig) -> Self {
        Self::new(
            config.auth_expired_codes.iter().cloned(),
            config.unavailable_codes.iter().cloned(),
        )
    }
}

impl Default for CodeClassifier {
    fn default() -> Self {
        Self::from_config(&crate::config::AuthConfig::default())
    }
}

impl ErrorClassifier for CodeClassifier {
    fn classify(&self, response: &RawResponse, detail: &ErrorDetail) -> Option<ErrorKind> {
        let code = detail.code.as_deref();

        if let Some(code) = code {
            if self.auth_expired.contains(code) {
                return Some(ErrorKind::AuthExpired);
            }
            if self.unavailable.contains(code) {
                return Some(ErrorKind::ServerUnavailable);
            }
        }

        let status = StatusCode::from_u16(response.status).ok();
        match status {
            Some(StatusCode::UNAUTHORIZED) => Some(ErrorKind::AuthExpired),
            Some(s) if s.is_server_error() => Some(ErrorKind::ServerUnavailable),
            Some(StatusCode::NOT_FOUND) => Some(ErrorKind::NotFound),
            Some(StatusCode::CONFLICT) => Some(ErrorKind::Conflict),
            Some(StatusCode::BAD_REQUEST) | Some(StatusCode::UNPROCESSABLE_ENTITY) => {
                Some(ErrorKind::Validation)
            }
            Some(s) if s.is_client_error() => Some(ErrorKind::Unknown),
            Some(s) if s.is_success() => match code {
                _ if !detail.envelope => None,
                Some(code) if SUCCESS_CODES.contains(&code) => None,
                _ => Some(ErrorKind::Unknown),
            },
            _ => Some(ErrorKind::Unknown),
        }
    }
}

/// Turn a raw response into the body or a typed error.
pub fn normalize(response: RawResponse, classifier: &dyn ErrorClassifier) -> Result<Value, ApiError> {
    let detail = ErrorDetail::from_body(&response.body);
    match classifier.classify(&response, &detail) {
        None => Ok(response.body),
        Some(kind) => {
            let code = detail
                .code
                .unwrap_or_else(|| response.status.to_string());
            let message = detail.message.unwrap_or_default();
            Err(ApiError::from_kind(kind, response.status, code, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(status: u16, body: Value) -> Option<ErrorKind> {
        let detail = ErrorDetail::from_body(&body);
        CodeClassifier::default().classify(&RawResponse::new(status, body), &detail)
    }

    #[test]
    fn test_detail_shapes() {
        assert_eq!(
            ErrorDetail::from_body(&json!({"code": "TOKEN_EXPIRED"})).code.as_deref(),
            Some("TOKEN_EXPIRED")
        );
        assert_eq!(
            ErrorDetail::from_body(&json!({"errID": 40101})).code.as_deref(),
            Some("40101")
        );
        assert_eq!(
            ErrorDetail::from_body(&json!({"error": {"errID": "E1", "message": "bad"}})),
            ErrorDetail {
                code: Some("E1".into()),
                message: Some("bad".into()),
                envelope: true,
            }
        );
        assert_eq!(ErrorDetail::from_body(&Value::Null), ErrorDetail::default());
    }

    #[test]
    fn test_auth_expired_by_code_and_status() {
        assert_eq!(
            classify(200, json!({"code": "TOKEN_EXPIRED"})),
            Some(ErrorKind::AuthExpired)
        );
        assert_eq!(classify(401, Value::Null), Some(ErrorKind::AuthExpired));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(classify(503, Value::Null), Some(ErrorKind::ServerUnavailable));
        assert_eq!(classify(404, Value::Null), Some(ErrorKind::NotFound));
        assert_eq!(classify(409, Value::Null), Some(ErrorKind::Conflict));
        assert_eq!(classify(422, Value::Null), Some(ErrorKind::Validation));
        assert_eq!(classify(403, Value::Null), Some(ErrorKind::Unknown));
        assert_eq!(classify(200, json!({"items": []})), None);
        assert_eq!(classify(200, json!({"code": 0, "data": 1})), None);
        assert_eq!(classify(200, json!({"errID": "E_PERM"})), Some(ErrorKind::Unknown));
        assert_eq!(classify(200, json!({"errID": 0})), None);
        assert_eq!(
            classify(200, json!({"error": {"code": "E_PERM"}})),
            Some(ErrorKind::Unknown)
        );
        assert_eq!(classify(200, json!({"error": "quota exceeded"})), Some(ErrorKind::Unknown));
    }

    #[test]
    fn test_domain_code_field_on_success_is_data() {
        let role = json!({"code": "AUDITOR", "name": "Auditor", "error": null});
        assert_eq!(classify(200, role.clone()), None);
        assert_eq!(
            normalize(RawResponse::new(200, role.clone()), &CodeClassifier::default()),
            Ok(role)
        );
        assert!(!ErrorDetail::from_body(&json!({"code": "AUDITOR"})).envelope);

        // Configured codes still win on a success status.
        assert_eq!(
            classify(200, json!({"code": "SERVICE_UNAVAILABLE"})),
            Some(ErrorKind::ServerUnavailable)
        );
    }

    #[test]
    fn test_classifier_sees_the_detail_normalize_extracted() {
        struct Strict;
        impl ErrorClassifier for Strict {
            fn classify(&self, _: &RawResponse, detail: &ErrorDetail) -> Option<ErrorKind> {
                detail.code.as_ref().map(|_| ErrorKind::Validation)
            }
        }

        let err = normalize(
            RawResponse::new(200, json!({"error": {"errID": "E9", "message": "nope"}})),
            &Strict,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ApiError::Domain {
                kind: ErrorKind::Validation,
                status: 200,
                code: "E9".into(),
                message: "nope".into(),
            }
        );
    }

    #[test]
    fn test_normalize_builds_typed_error() {
        let err = normalize(
            RawResponse::new(409, json!({"code": "ROLE_EXISTS", "message": "role exists"})),
            &CodeClassifier::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ApiError::Domain {
                kind: ErrorKind::Conflict,
                status: 409,
                code: "ROLE_EXISTS".into(),
                message: "role exists".into(),
            }
        );

        let err = normalize(RawResponse::new(502, Value::Null), &CodeClassifier::default())
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::ServerUnavailable {
                status: 502,
                code: "502".into()
            }
        );
    }
}
