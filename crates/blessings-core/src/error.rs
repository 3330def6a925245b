//! Error types for Blessings core.

use thiserror::Error;

/// Core errors raised by path, tree, and record operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The path is not a well-formed resource path.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// A store snapshot could not be hydrated into a permission tree.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub(crate) fn invalid_path(path: &str, reason: &'static str) -> Self {
        CoreError::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
