//! Error types for the EMOSYNC core library.

use thiserror::Error;

/// Top-level error type for core operations (storage, configuration, encoding).
#[derive(Error, Debug)]
pub enum CoreError {
    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A persisted value exists but cannot be interpreted.
    #[error("Corrupt value under key '{key}': {reason}")]
    CorruptValue {
        /// Storage key holding the bad value.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, CoreError>;
