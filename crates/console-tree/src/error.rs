//! Tree error types.

use console_core::ApiError;
use thiserror::Error;

/// Errors from tree operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    /// The page fetch failed. The tree is unchanged.
    #[error(transparent)]
    Fetch(#[from] ApiError),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// The level has not been fetched yet.
    #[error("level not loaded: {0}")]
    NotLoaded(String),
}

impl TreeError {
    pub fn is_fetch(&self) -> bool {
        matches!(self, TreeError::Fetch(_))
    }
}
