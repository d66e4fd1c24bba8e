//! Error types for lore

use thiserror::Error;

/// Main error type for lore operations
#[derive(Error, Debug)]
pub enum LoreError {
    /// An invariant was violated at write time (confidence out of range,
    /// malformed required field, changed variant tag, duplicate id)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The referenced memory does not exist
    #[error("Memory not found: {0}")]
    NotFound(String),

    /// SQLite failure wrapping the underlying cause
    #[error("Storage error during {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A blocking storage task panicked, was cancelled, or found a poisoned lock
    #[error("Storage task error: {0}")]
    Task(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LoreError {
    /// Wrap a rusqlite error, mapping constraint violations to `Validation`.
    pub fn storage(context: impl Into<String>, source: rusqlite::Error) -> Self {
        let context = context.into();
        match source {
            rusqlite::Error::SqliteFailure(ref err, ref message)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let detail = message.clone().unwrap_or_else(|| err.to_string());
                LoreError::Validation(format!("{context}: {detail}"))
            }
            source => LoreError::Storage { context, source },
        }
    }

    /// True for the `NotFound` variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoreError::NotFound(_))
    }

    /// True for the `Validation` variant
    pub fn is_validation(&self) -> bool {
        matches!(self, LoreError::Validation(_))
    }
}

impl From<serde_json::Error> for LoreError {
    fn from(e: serde_json::Error) -> Self {
        LoreError::Serialization(e.to_string())
    }
}

/// Result type alias for lore operations
pub type Result<T> = std::result::Result<T, LoreError>;
