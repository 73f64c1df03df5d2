//! Authorization errors.

use thiserror::Error;

use super::Denial;
use crate::db::DbError;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Access denied: {0}")]
    Forbidden(Denial),

    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}
