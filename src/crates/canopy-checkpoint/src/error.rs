//! Error types for progress persistence

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while saving or loading run progress
#[derive(Error, Debug)]
pub enum StoreError {
    /// Binary serialization error
    #[error("binary serialization error: {0}")]
    Binary(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record is not usable
    #[error("invalid stored record: {0}")]
    Invalid(String),
}
