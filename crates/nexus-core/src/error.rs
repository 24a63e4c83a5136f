//! Error types for the nexus workspace.

use thiserror::Error;

/// Result type alias using nexus's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for nexus operations.
///
/// Malformed-but-received generation output is deliberately *not* an error:
/// the section parser, reranker, and answer parser recover from it locally
/// with fallback behavior. Only transport-level failures of the external
/// services surface here (`Embedding`, `Inference`).
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Source has no text to index
    #[error("No content: {0}")]
    NoContent(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Embedding service call failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Generation service call failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
