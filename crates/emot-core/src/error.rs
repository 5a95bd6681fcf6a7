//! Error types for emot-core.

use thiserror::Error;

use crate::providers::ProviderError;

/// Result type alias using emot-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error classification used at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or empty required fields. Never retried.
    InvalidInput,
    /// Unknown session or cached file.
    NotFound,
    /// Every storage tier failed.
    StorageDegraded,
    /// LLM, transcription or synthesis provider failed.
    ProviderFailure,
    /// Anything unexpected.
    Internal,
}

/// Core error types for emot operations
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    // Storage errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    // Provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Database(_)
            | Self::LockPoisoned
            | Self::StorageUnavailable(_)
            | Self::Timeout { .. } => ErrorKind::StorageDegraded,
            Self::Provider(_) => ErrorKind::ProviderFailure,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
