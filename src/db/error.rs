use thiserror::Error;

/// Failures reported by a rule, role or refresh-token store.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Record not found")]
    NotFound,

    /// A record with the same key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid record: {0}")]
    Validation(String),

    /// The store could not be reached or failed mid-operation.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type DbResult<T> = Result<T, DbError>;
