//! Error taxonomy shared by every layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Network-level failure raised by the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// No response at all (status 0).
    #[error("service is offline or unreachable")]
    Offline,

    /// The per-call timeout elapsed.
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    /// The call was aborted before completing.
    #[error("request aborted: {0}")]
    Aborted(String),
}

/// Classification of an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthExpired,
    ServerUnavailable,
    NotFound,
    Conflict,
    Validation,
    Unknown,
}

impl ErrorKind {
    /// Domain errors are passed through to the caller untouched.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound | ErrorKind::Conflict | ErrorKind::Validation | ErrorKind::Unknown
        )
    }
}

/// Error type for every call that goes through the console request layer.
///
/// Produced once at the normalization boundary; downstream layers only
/// match on variants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportFailure),

    #[error("credential expired ({code})")]
    AuthExpired { code: String },

    #[error("server unavailable: HTTP {status} ({code})")]
    ServerUnavailable { status: u16, code: String },

    #[error("{kind:?} error: HTTP {status} ({code}): {message}")]
    Domain {
        kind: ErrorKind,
        status: u16,
        code: String,
        message: String,
    },

    /// The refresh cycle failed; the user has to log in again.
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Build the error for a classified response.
    pub fn from_kind(kind: ErrorKind, status: u16, code: String, message: String) -> Self {
        match kind {
            ErrorKind::AuthExpired => ApiError::AuthExpired { code },
            ErrorKind::ServerUnavailable => ApiError::ServerUnavailable { status, code },
            kind => ApiError::Domain {
                kind,
                status,
                code,
                message,
            },
        }
    }

    /// Check if this error should be absorbed by a refresh cycle.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired { .. })
    }

    /// Check if this is a 5xx-class failure.
    pub fn is_server_unavailable(&self) -> bool {
        matches!(self, ApiError::ServerUnavailable { .. })
    }

    /// Check if this is a network-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    /// Get the response classification, if this error came from a response.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ApiError::AuthExpired { .. } => Some(ErrorKind::AuthExpired),
            ApiError::ServerUnavailable { .. } => Some(ErrorKind::ServerUnavailable),
            ApiError::Domain { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_kind() {
        let err = ApiError::from_kind(
            ErrorKind::AuthExpired,
            401,
            "TOKEN_EXPIRED".into(),
            String::new(),
        );
        assert!(err.is_auth_expired());
        assert_eq!(err.kind(), Some(ErrorKind::AuthExpired));

        let err = ApiError::from_kind(ErrorKind::Conflict, 409, "DUP".into(), "exists".into());
        assert_eq!(err.kind(), Some(ErrorKind::Conflict));
        assert!(!err.is_auth_expired());
    }

    #[test]
    fn test_transport_errors_have_no_kind() {
        let err: ApiError = TransportFailure::Offline.into();
        assert!(err.is_transport());
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_domain_kinds() {
        assert!(ErrorKind::Validation.is_domain());
        assert!(!ErrorKind::AuthExpired.is_domain());
        assert!(!ErrorKind::ServerUnavailable.is_domain());
    }
}
