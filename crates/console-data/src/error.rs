//! Data layer error types.

use thiserror::Error;

/// Errors raised while assembling the data layer.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid replay script: {0}")]
    Script(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] console_core::ConfigError),
}
