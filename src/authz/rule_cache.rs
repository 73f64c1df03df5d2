//! Read-optimized view of the rule store.
//!
//! Rules without a wildcard go into an exact table keyed by `METHOD|PATH`.
//! Wildcard rules are bucketed by method and then by segment count, so a
//! request is only compared against patterns that could possibly match it.
//! A refresh builds a new [`RuleIndex`] and swaps it in whole.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::path::{count_segments, has_wildcard, segments_match};
use crate::{
    config::RuleCacheConfig,
    db::{DbError, DbResult, RuleRepo},
    models::{HttpMethod, Rule, rule_id},
};

/// Default time after which a cache is considered stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(100 * 60);

/// Immutable snapshot of all rules, indexed for lookup.
#[derive(Debug, Default)]
pub struct RuleIndex {
    exact: HashMap<String, Vec<Rule>>,
    patterns: HashMap<HttpMethod, HashMap<usize, Vec<Rule>>>,
    exact_count: usize,
    pattern_count: usize,
}

impl RuleIndex {
    pub fn build(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut index = Self::default();
        for rule in rules {
            if has_wildcard(&rule.path) {
                index
                    .patterns
                    .entry(rule.method)
                    .or_default()
                    .entry(count_segments(&rule.path))
                    .or_default()
                    .push(rule);
                index.pattern_count += 1;
            } else {
                index
                    .exact
                    .entry(rule_id(rule.method, &rule.path))
                    .or_default()
                    .push(rule);
                index.exact_count += 1;
            }
        }
        index
    }

    /// Rules matching `(method, path)`.
    ///
    /// An exact hit is returned as-is without consulting the patterns.
    pub fn find(&self, method: HttpMethod, path: &str) -> Vec<&Rule> {
        if let Some(rules) = self.exact.get(&rule_id(method, path))
            && !rules.is_empty()
        {
            return rules.iter().collect();
        }

        let Some(bucket) = self
            .patterns
            .get(&method)
            .and_then(|by_count| by_count.get(&count_segments(path)))
        else {
            return Vec::new();
        };

        bucket
            .iter()
            .filter(|rule| segments_match(&rule.path, path))
            .collect()
    }

    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }

    pub fn len(&self) -> usize {
        self.exact_count + self.pattern_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rebuilds a cache after the rule store changed.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self) -> DbResult<()>;
}

pub struct RuleCache {
    repo: Arc<dyn RuleRepo>,
    service_name: Option<String>,
    stale_after: Duration,
    index: RwLock<Arc<RuleIndex>>,
    last_refresh: RwLock<Option<Instant>>,
    /// Serializes rebuilds so an older snapshot never replaces a newer one.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl RuleCache {
    /// Create an empty cache. Call [`refresh`](Self::refresh) before serving.
    pub fn new(repo: Arc<dyn RuleRepo>, service_name: Option<String>) -> Self {
        Self {
            repo,
            service_name: service_name.filter(|s| !s.is_empty()),
            stale_after: DEFAULT_STALE_AFTER,
            index: RwLock::new(Arc::new(RuleIndex::default())),
            last_refresh: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(repo: Arc<dyn RuleRepo>, config: &RuleCacheConfig) -> Self {
        Self::new(repo, config.service_name()).with_stale_after(config.stale_after())
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Reload every rule from the store and swap in a fresh index.
    ///
    /// On failure the current index is kept and the error is returned.
    pub async fn refresh(&self) -> DbResult<usize> {
        let _guard = self.refresh_lock.lock().await;

        let rules = match self.repo.list_all(self.service_name.as_deref()).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    service = ?self.service_name,
                    "Failed to load rules, keeping current cache"
                );
                return Err(e);
            }
        };

        let index = RuleIndex::build(rules);
        let total = index.len();
        if index.is_empty() {
            tracing::warn!(service = ?self.service_name, "Rule cache refreshed with no rules");
        } else {
            tracing::info!(
                exact = index.exact_count(),
                patterns = index.pattern_count(),
                service = ?self.service_name,
                "Rule cache refreshed"
            );
        }

        *self.index.write() = Arc::new(index);
        *self.last_refresh.write() = Some(Instant::now());
        Ok(total)
    }

    /// Current snapshot. Cheap; holds no lock after returning.
    pub fn snapshot(&self) -> Arc<RuleIndex> {
        self.index.read().clone()
    }

    /// Owned copies of the rules matching `(method, path)`.
    pub fn find_matching_rules(&self, method: HttpMethod, path: &str) -> Vec<Rule> {
        let index = self.snapshot();
        index.find(method, path).into_iter().cloned().collect()
    }

    pub fn last_refreshed(&self) -> Option<Instant> {
        *self.last_refresh.read()
    }

    /// Never refreshed, or refreshed longer than `stale_after` ago.
    pub fn is_stale(&self) -> bool {
        self.last_refreshed()
            .is_none_or(|at| at.elapsed() >= self.stale_after)
    }

    /// Refresh only when stale. Returns whether a refresh happened.
    pub async fn refresh_if_stale(&self) -> DbResult<bool> {
        if !self.is_stale() {
            return Ok(false);
        }
        tracing::info!("Rule cache is stale, refreshing");
        self.refresh().await.map(|_| true)
    }
}

#[async_trait]
impl CacheInvalidator for RuleCache {
    async fn invalidate(&self) -> Result<(), DbError> {
        self.refresh().await.map(|_| ())
    }
}
