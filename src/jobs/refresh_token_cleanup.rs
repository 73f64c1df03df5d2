//! Periodic deletion of expired refresh tokens.

use std::sync::Arc;

use crate::{auth::RefreshTokenService, config::RefreshTokenConfig};

/// Starts the cleanup worker. Runs until the task is cancelled.
pub async fn start_refresh_token_cleanup_worker(
    service: Arc<RefreshTokenService>,
    config: RefreshTokenConfig,
) {
    tracing::info!(
        cleanup_interval_secs = config.cleanup_interval_secs,
        "Starting refresh token cleanup worker"
    );

    let interval = config.cleanup_interval();

    loop {
        tokio::time::sleep(interval).await;

        match service.cleanup_expired().await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "Deleted expired refresh tokens"),
            Err(e) => {
                tracing::warn!(error = %e, "Refresh token cleanup failed, will retry next interval")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::{
        db::{RefreshTokenRepo, memory::MemoryRefreshTokenRepo},
        models::CreateRefreshToken,
    };

    #[tokio::test(start_paused = true)]
    async fn test_worker_deletes_expired_tokens() {
        let repo = Arc::new(MemoryRefreshTokenRepo::new());
        repo.create(CreateRefreshToken {
            token_hash: "expired".into(),
            user_id: "u1".into(),
            expires_at: Utc::now() - chrono::Duration::minutes(5),
        })
        .await
        .unwrap();
        let service = Arc::new(RefreshTokenService::new(
            repo.clone(),
            Duration::from_secs(3600),
        ));
        service.issue("u1").await.unwrap();

        let config = RefreshTokenConfig {
            cleanup_interval_secs: 10,
        };
        let worker = tokio::spawn(start_refresh_token_cleanup_worker(service, config));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(repo.len().await, 1);
        worker.abort();
    }
}
