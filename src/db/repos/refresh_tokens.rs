use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    models::{CreateRefreshToken, RefreshToken},
};

#[async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    async fn create(&self, input: CreateRefreshToken) -> DbResult<RefreshToken>;

    /// Look up a token by the SHA-256 hash of its raw value.
    async fn get_by_hash(&self, token_hash: &str) -> DbResult<Option<RefreshToken>>;

    /// Delete a token by hash. Returns `false` if nothing was deleted.
    async fn delete_by_hash(&self, token_hash: &str) -> DbResult<bool>;

    /// Delete every token owned by a user. Returns the number deleted.
    async fn delete_by_user(&self, user_id: &str) -> DbResult<u64>;

    /// Delete every token that expired at or before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> DbResult<u64>;
}
