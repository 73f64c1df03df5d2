//! Time-based fallback refresh of the rule cache.
//!
//! Mutations through the rule service invalidate the cache directly. This
//! worker only catches changes made behind its back (direct store edits,
//! other instances) by refreshing once the cache is older than
//! `stale_after_secs`.

use std::sync::Arc;

use crate::{authz::RuleCache, config::RuleCacheConfig};

/// Starts the staleness worker. Runs until the task is cancelled.
pub async fn start_rule_cache_refresh_worker(cache: Arc<RuleCache>, config: RuleCacheConfig) {
    tracing::info!(
        check_interval_secs = config.check_interval_secs,
        stale_after_secs = config.stale_after_secs,
        "Starting rule cache refresh worker"
    );

    let interval = config.check_interval();

    loop {
        tokio::time::sleep(interval).await;
        run_check(&cache).await;
    }
}

/// One staleness check. Returns whether a refresh succeeded.
pub async fn run_check(cache: &RuleCache) -> bool {
    match cache.refresh_if_stale().await {
        Ok(refreshed) => refreshed,
        Err(e) => {
            // The cache keeps serving the previous snapshot
            tracing::warn!(error = %e, "Rule cache refresh failed, will retry next interval");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        db::{RuleRepo, memory::MemoryRuleRepo},
        models::{AccessType, HttpMethod, Rule},
    };

    #[tokio::test]
    async fn test_stale_cache_is_refreshed() {
        let repo = Arc::new(MemoryRuleRepo::new());
        let cache = RuleCache::new(repo.clone(), None).with_stale_after(Duration::ZERO);
        cache.refresh().await.unwrap();

        repo.create(Rule::new(HttpMethod::Get, "/late", AccessType::Public))
            .await
            .unwrap();

        assert!(run_check(&cache).await);
        assert_eq!(cache.find_matching_rules(HttpMethod::Get, "/late").len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_cache_is_left_alone() {
        let repo = Arc::new(MemoryRuleRepo::new());
        let cache = RuleCache::new(repo.clone(), None).with_stale_after(Duration::from_secs(3600));
        cache.refresh().await.unwrap();

        repo.create(Rule::new(HttpMethod::Get, "/late", AccessType::Public))
            .await
            .unwrap();

        assert!(!run_check(&cache).await);
        assert!(cache.find_matching_rules(HttpMethod::Get, "/late").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_refreshes_on_interval() {
        let repo = Arc::new(MemoryRuleRepo::new());
        let cache = Arc::new(RuleCache::new(repo.clone(), None).with_stale_after(Duration::ZERO));
        let config = RuleCacheConfig {
            check_interval_secs: 60,
            ..Default::default()
        };

        let worker = tokio::spawn(start_rule_cache_refresh_worker(cache.clone(), config));
        repo.create(Rule::new(HttpMethod::Get, "/late", AccessType::Public))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.find_matching_rules(HttpMethod::Get, "/late").len(), 1);
        worker.abort();
    }
}
