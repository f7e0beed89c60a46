//! Credential errors.

use thiserror::Error;

/// Errors raised by credential providers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No refresh token is available.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The identity service refused the refresh.
    #[error("refresh rejected: {0}")]
    RefreshRejected(String),

    /// The refresh call itself failed.
    #[error("refresh call failed: {0}")]
    Transport(String),

    /// The refresh response could not be understood.
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// Check if retrying later could help.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Transport(_))
    }
}
