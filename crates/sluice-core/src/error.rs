//! Error types for Sluice.

use thiserror::Error;

/// Core error type for Sluice domain operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid canonical key: {0}")]
    InvalidKey(String),

    #[error("Embedding dimension mismatch for {field}: expected {expected}, got {actual}")]
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using Sluice's core Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
