//! Error types for Quarry core operations.
//!
//! Library code returns [`QuarryError`] through the crate-wide [`Result`]
//! alias. Lookup misses are not errors (they are `Option::None`), and query
//! syntax errors are reported as a parse outcome rather than an error so the
//! searcher can branch on them cheaply.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using QuarryError
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Core error types for Quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    // === Store Errors ===
    /// The store path exists but is not a directory, or is missing when
    /// opened without create mode
    #[error("invalid database path {path}: {reason}")]
    DatabaseType { path: PathBuf, reason: String },

    /// The persisted metadata file could not be decoded
    #[error("database metadata is corrupted: {reason}")]
    MetaCorrupted { reason: String },

    // === Codec Errors ===
    /// A read ran past the end of the buffer
    #[error("read out of range: needed {needed} bytes, {remaining} remaining")]
    OutOfRange { needed: usize, remaining: usize },

    // === Extraction Errors ===
    /// A file could not be turned into words and metadata
    #[error("extraction failed for {path}: {reason}")]
    Extract { path: PathBuf, reason: String },

    /// JSON content could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Query Errors ===
    /// The query text is not valid
    #[error("syntax error at byte {pos}: expected {expected}")]
    Syntax { pos: usize, expected: String },

    // === Value Errors ===
    /// A dotted key with an empty segment
    #[error("invalid key: {key:?}")]
    InvalidKey { key: String },

    /// A value that cannot be represented (mixed array, bad comparison)
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },

    /// A datetime string not in `YYYY-MM-DD HH:MM:SS` form
    #[error("invalid datetime: {input:?}")]
    InvalidDateTime { input: String },

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// Serialization/deserialization of auxiliary files failed
    #[error("serialization error: {0}")]
    Serialization(String),

    // === Internal Errors ===
    /// Internal error that should not happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl QuarryError {
    /// Returns true if the store on disk cannot be used and must be rebuilt
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            QuarryError::MetaCorrupted { .. }
                | QuarryError::OutOfRange { .. }
                | QuarryError::DatabaseType { .. }
        )
    }

    /// Returns true if this error is recoverable (e.g., can retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, QuarryError::Io(_))
    }

    /// Create a metadata corruption error
    pub fn corrupted(reason: impl Into<String>) -> Self {
        QuarryError::MetaCorrupted {
            reason: reason.into(),
        }
    }

    /// Create an extraction error
    pub fn extract(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        QuarryError::Extract {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        QuarryError::InvalidValue {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        QuarryError::Internal(reason.into())
    }
}

impl From<bincode::Error> for QuarryError {
    fn from(err: bincode::Error) -> Self {
        QuarryError::Serialization(err.to_string())
    }
}
