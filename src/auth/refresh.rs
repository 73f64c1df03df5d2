//! Refresh-token issue, rotation and revocation.
//!
//! Rotation deletes the presented token before storing its replacement. If the
//! process dies between the two writes the session is lost and the user has to
//! sign in again; access is never granted without a stored token.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use super::RefreshTokenError;
use crate::{
    db::{AccountStatusRepo, RefreshTokenRepo},
    models::{CreateRefreshToken, generate_refresh_token, hash_refresh_token},
};

/// A freshly issued refresh token. `token` is the only copy of the raw value.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

pub struct RefreshTokenService {
    repo: Arc<dyn RefreshTokenRepo>,
    accounts: Option<Arc<dyn AccountStatusRepo>>,
    ttl: Duration,
}

impl RefreshTokenService {
    pub fn new(repo: Arc<dyn RefreshTokenRepo>, ttl: Duration) -> Self {
        Self {
            repo,
            accounts: None,
            ttl,
        }
    }

    /// Check account status on every rotation; inactive accounts lose all tokens.
    pub fn with_account_status(mut self, accounts: Arc<dyn AccountStatusRepo>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate and persist a new token for `user_id`.
    pub async fn issue(&self, user_id: &str) -> Result<IssuedRefreshToken, RefreshTokenError> {
        let (token, token_hash) = generate_refresh_token();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let stored = self
            .repo
            .create(CreateRefreshToken {
                token_hash,
                user_id: user_id.to_string(),
                expires_at,
            })
            .await?;

        tracing::debug!(user_id = %user_id, token_id = %stored.id, "Issued refresh token");

        Ok(IssuedRefreshToken {
            token,
            user_id: stored.user_id,
            expires_at: stored.expires_at,
        })
    }

    /// Exchange a refresh token for a new one bound to the same user.
    ///
    /// The presented token is consumed even on expiry. Presenting a token that
    /// was already rotated away fails with [`RefreshTokenError::Invalid`].
    pub async fn rotate(&self, token: &str) -> Result<IssuedRefreshToken, RefreshTokenError> {
        let token_hash = hash_refresh_token(token);

        let Some(stored) = self.repo.get_by_hash(&token_hash).await? else {
            tracing::debug!("Refresh token not found");
            return Err(RefreshTokenError::Invalid);
        };

        if stored.is_expired() {
            self.repo.delete_by_hash(&token_hash).await?;
            tracing::debug!(user_id = %stored.user_id, "Refresh token expired");
            return Err(RefreshTokenError::Expired);
        }

        if let Some(accounts) = &self.accounts
            && !accounts.is_active(&stored.user_id).await?
        {
            let revoked = self.repo.delete_by_user(&stored.user_id).await?;
            tracing::info!(
                user_id = %stored.user_id,
                revoked,
                "Account inactive, revoked all refresh tokens"
            );
            return Err(RefreshTokenError::Invalid);
        }

        // A concurrent rotation of the same token already consumed it.
        if !self.repo.delete_by_hash(&token_hash).await? {
            tracing::debug!(user_id = %stored.user_id, "Refresh token already rotated");
            return Err(RefreshTokenError::Invalid);
        }

        self.issue(&stored.user_id).await.inspect_err(|e| {
            tracing::error!(
                user_id = %stored.user_id,
                error = %e,
                "Refresh token consumed but replacement could not be stored"
            );
        })
    }

    /// Delete one token (logout). Returns `false` if it did not exist.
    pub async fn revoke(&self, token: &str) -> Result<bool, RefreshTokenError> {
        Ok(self.repo.delete_by_hash(&hash_refresh_token(token)).await?)
    }

    /// Delete every token owned by `user_id`.
    pub async fn revoke_all(&self, user_id: &str) -> Result<u64, RefreshTokenError> {
        let revoked = self.repo.delete_by_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "Revoked all refresh tokens");
        Ok(revoked)
    }

    /// Delete tokens past their expiry.
    pub async fn cleanup_expired(&self) -> Result<u64, RefreshTokenError> {
        Ok(self.repo.delete_expired(Utc::now()).await?)
    }
}
