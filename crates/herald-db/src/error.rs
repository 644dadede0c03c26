use thiserror::Error;

use herald_types::models::ValidationError;

/// Store outcomes callers are expected to handle. All of these are
/// recoverable; the HTTP layer maps each variant to its own status code.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or out-of-bounds input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The caller is not allowed to touch this entity.
    #[error("{0}")]
    Forbidden(&'static str),

    /// A uniqueness rule was violated.
    #[error("{0}")]
    Conflict(&'static str),

    /// The store itself failed. Retryable; nothing wrong with the input.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        StoreError::InvalidInput(e.to_string())
    }
}

/// True when a statement bounced off a UNIQUE or PRIMARY KEY constraint.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
