use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    db::{DbError, DbResult, RefreshTokenRepo},
    models::{CreateRefreshToken, RefreshToken},
};

/// Refresh tokens keyed by hash.
pub struct MemoryRefreshTokenRepo {
    tokens: RwLock<HashMap<String, RefreshToken>>,
}

impl MemoryRefreshTokenRepo {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

impl Default for MemoryRefreshTokenRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RefreshTokenRepo for MemoryRefreshTokenRepo {
    async fn create(&self, input: CreateRefreshToken) -> DbResult<RefreshToken> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&input.token_hash) {
            return Err(DbError::Conflict("Refresh token already exists".into()));
        }
        let token = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: input.token_hash,
            user_id: input.user_id,
            expires_at: input.expires_at,
            created_at: Utc::now(),
        };
        tokens.insert(token.token_hash.clone(), token.clone());
        Ok(token)
    }

    async fn get_by_hash(&self, token_hash: &str) -> DbResult<Option<RefreshToken>> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(token_hash).cloned())
    }

    async fn delete_by_hash(&self, token_hash: &str) -> DbResult<bool> {
        let mut tokens = self.tokens.write().await;
        Ok(tokens.remove(token_hash).is_some())
    }

    async fn delete_by_user(&self, user_id: &str) -> DbResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}
