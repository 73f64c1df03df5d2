use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted refresh token.
///
/// Only the SHA-256 hash of the opaque value is stored; the raw value is
/// handed to the client once and never kept server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Input for persisting a new refresh token.
#[derive(Debug, Clone)]
pub struct CreateRefreshToken {
    pub token_hash: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}
