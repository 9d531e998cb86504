//! Storage error types.

use thiserror::Error;

/// Errors surfaced by the storage layer and the sync coordinator.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Entity absent or not owned by the caller. The two cases are
    /// deliberately indistinguishable.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    /// Caller-correctable condition: malformed payload, invalid version
    /// number, retention guard violation.
    #[error("{0}")]
    Validation(String),
    /// Underlying store failure. Always rolls back the whole transaction
    /// and surfaces as a generic server error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Corrupt stored record or serialization failure.
    #[error("storage error: {0}")]
    Other(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
