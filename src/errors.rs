use sea_orm::error::DbErr;
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy surfaced by the engine's services.
///
/// Every failure is typed; nothing is silently swallowed except the bounded
/// document-number collision retry, which is surfaced as [`Conflict`] once
/// exhausted.
///
/// [`Conflict`]: ServiceError::Conflict
#[derive(Error, Debug, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Delete or replace blocked by an existing dependent reference.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Sum of quality buckets disagrees with the declared line quantity.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A generated document number collided with an existing one.
    #[error("Duplicate document number: {0}")]
    DuplicateNumbering(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Helper to convert database errors, usable as `map_err(ServiceError::db_error)`.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ServiceError::NotFound(what.into())
    }
}
