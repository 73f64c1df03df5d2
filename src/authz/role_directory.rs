//! Role name to id resolution with an in-memory cache.
//!
//! Also remembers the id of the super-role. When the super-role does not
//! exist yet the directory keeps working without a bypass and retries the
//! lookup at most once per negative-cache interval.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::RwLock;
use tokio::{sync::Mutex, time::Instant};

use crate::{
    config::RoleDirectoryConfig,
    db::{DbResult, RoleRepo},
    models::{HasId, HasName, Role, RoleId},
};

/// How long to remember that a role name does not exist.
pub const DEFAULT_NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Maximum number of negative cache entries before eviction kicks in.
const MAX_NEGATIVE_CACHE_ENTRIES: usize = 10_000;

/// Role repository over the built-in [`Role`] model.
pub type DynRoleRepo = dyn RoleRepo<Role = Role>;

#[derive(Default)]
struct DirectoryInner {
    ids_by_name: HashMap<String, RoleId>,
    names_by_id: HashMap<RoleId, String>,
    /// Names that had no matching role, with the time of the lookup.
    negative_cache: HashMap<String, Instant>,
    super_role_id: Option<RoleId>,
    /// Last time the super-role lookup came back empty.
    super_role_missed_at: Option<Instant>,
}

pub struct RoleDirectory<R: RoleRepo + ?Sized = DynRoleRepo> {
    repo: Arc<R>,
    super_role: String,
    negative_ttl: Duration,
    inner: RwLock<DirectoryInner>,
    /// Serializes super-role reloads so concurrent misses query once.
    load_mutex: Mutex<()>,
}

impl<R: RoleRepo + ?Sized> RoleDirectory<R> {
    pub fn new(repo: Arc<R>, super_role: impl Into<String>) -> Self {
        Self {
            repo,
            super_role: super_role.into(),
            negative_ttl: DEFAULT_NEGATIVE_CACHE_TTL,
            inner: RwLock::new(DirectoryInner::default()),
            load_mutex: Mutex::new(()),
        }
    }

    pub fn from_config(repo: Arc<R>, config: &RoleDirectoryConfig) -> Self {
        Self::new(repo, config.super_role.clone())
            .with_negative_cache_ttl(Duration::from_secs(config.negative_cache_secs))
    }

    pub fn with_negative_cache_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl;
        self
    }

    /// Resolve the super-role eagerly. A missing role or a storage error is
    /// logged and leaves the bypass disabled.
    pub async fn init(self) -> Self {
        match self.reload_super_role().await {
            Ok(Some(id)) => {
                tracing::info!(role = %self.super_role, role_id = id, "Resolved super-role");
            }
            Ok(None) => {
                tracing::warn!(
                    role = %self.super_role,
                    "Super-role not found, bypass disabled until it exists"
                );
            }
            Err(e) => {
                tracing::warn!(role = %self.super_role, error = %e, "Failed to resolve super-role");
            }
        }
        self
    }

    pub fn super_role_name(&self) -> &str {
        &self.super_role
    }

    /// The cached super-role id, without touching storage.
    pub fn super_role_id(&self) -> Option<RoleId> {
        self.inner.read().super_role_id
    }

    /// The super-role id, looking it up again if it was missing and the
    /// negative-cache interval has passed.
    pub async fn ensure_super_role(&self) -> Option<RoleId> {
        {
            let inner = self.inner.read();
            if inner.super_role_id.is_some() {
                return inner.super_role_id;
            }
            if inner
                .super_role_missed_at
                .is_some_and(|at| at.elapsed() < self.negative_ttl)
            {
                return None;
            }
        }

        let _guard = self.load_mutex.lock().await;
        // Another task may have loaded it while we waited.
        {
            let inner = self.inner.read();
            if inner.super_role_id.is_some()
                || inner
                    .super_role_missed_at
                    .is_some_and(|at| at.elapsed() < self.negative_ttl)
            {
                return inner.super_role_id;
            }
        }

        match self.reload_super_role().await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(role = %self.super_role, error = %e, "Failed to resolve super-role");
                self.inner.write().super_role_missed_at = Some(Instant::now());
                None
            }
        }
    }

    /// Query storage for the super-role and update the cache.
    pub async fn reload_super_role(&self) -> DbResult<Option<RoleId>> {
        let role = self.repo.get_by_name(&self.super_role).await?;
        let mut inner = self.inner.write();
        match role {
            Some(role) => {
                let id = role.id();
                inner.super_role_id = Some(id);
                inner.super_role_missed_at = None;
                inner.ids_by_name.insert(self.super_role.clone(), id);
                inner.names_by_id.insert(id, self.super_role.clone());
                Ok(Some(id))
            }
            None => {
                inner.super_role_id = None;
                inner.super_role_missed_at = Some(Instant::now());
                Ok(None)
            }
        }
    }

    /// Resolve one role name, caching both hits and misses.
    pub async fn role_id_by_name(&self, name: &str) -> DbResult<Option<RoleId>> {
        {
            let inner = self.inner.read();
            if let Some(id) = inner.ids_by_name.get(name) {
                return Ok(Some(*id));
            }
            if inner
                .negative_cache
                .get(name)
                .is_some_and(|at| at.elapsed() < self.negative_ttl)
            {
                return Ok(None);
            }
        }

        let role = self.repo.get_by_name(name).await?;
        let mut inner = self.inner.write();
        match role {
            Some(role) => {
                let id = role.id();
                inner.negative_cache.remove(name);
                inner.ids_by_name.insert(role.name().to_string(), id);
                inner.names_by_id.insert(id, role.name().to_string());
                Ok(Some(id))
            }
            None => {
                self.remember_missing(&mut inner, name);
                Ok(None)
            }
        }
    }

    /// Resolve many names with at most one storage query. Unknown names are skipped.
    pub async fn role_ids_by_names(&self, names: &[String]) -> DbResult<Vec<RoleId>> {
        let mut resolved = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        {
            let inner = self.inner.read();
            for name in names {
                match inner.ids_by_name.get(name) {
                    Some(id) => resolved.push(*id),
                    None => missing.push(name.clone()),
                }
            }
        }

        if !missing.is_empty() {
            let found = self.repo.get_ids_by_names(&missing).await?;
            let mut inner = self.inner.write();
            for name in &missing {
                match found.get(name) {
                    Some(id) => {
                        inner.negative_cache.remove(name);
                        inner.ids_by_name.insert(name.clone(), *id);
                        inner.names_by_id.insert(*id, name.clone());
                        resolved.push(*id);
                    }
                    None => {
                        tracing::debug!(role = %name, "Unknown role name skipped");
                        self.remember_missing(&mut inner, name);
                    }
                }
            }
        }

        resolved.dedup();
        Ok(resolved)
    }

    /// Names for the given ids. Unknown ids are skipped.
    pub async fn role_names_by_ids(&self, ids: &[RoleId]) -> DbResult<Vec<String>> {
        let mut names = Vec::with_capacity(ids.len());
        for id in ids {
            let cached = self.inner.read().names_by_id.get(id).cloned();
            if let Some(name) = cached {
                names.push(name);
                continue;
            }
            if let Some(role) = self.repo.get_by_id(*id).await? {
                let name = role.name().to_string();
                let mut inner = self.inner.write();
                inner.ids_by_name.insert(name.clone(), *id);
                inner.names_by_id.insert(*id, name.clone());
                names.push(name);
            } else {
                tracing::debug!(role_id = id, "Unknown role id skipped");
            }
        }
        Ok(names)
    }

    /// Role ids assigned to a user in storage.
    pub async fn role_ids_of_user(&self, user_id: &str) -> DbResult<Vec<RoleId>> {
        self.repo.role_ids_of_user(user_id).await
    }

    /// Drop cached name and id mappings. The super-role id is kept.
    pub fn invalidate(&self) {
        let mut inner = self.inner.write();
        inner.ids_by_name.clear();
        inner.names_by_id.clear();
        inner.negative_cache.clear();
    }

    fn remember_missing(&self, inner: &mut DirectoryInner, name: &str) {
        if inner.negative_cache.len() >= MAX_NEGATIVE_CACHE_ENTRIES {
            let ttl = self.negative_ttl;
            inner.negative_cache.retain(|_, at| at.elapsed() < ttl);
            if inner.negative_cache.len() >= MAX_NEGATIVE_CACHE_ENTRIES {
                inner.negative_cache.clear();
            }
        }
        inner.negative_cache.insert(name.to_string(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::db::memory::MemoryRoleRepo;

    /// Counts `get_by_name` calls to observe caching.
    struct CountingRepo {
        inner: MemoryRoleRepo,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl RoleRepo for CountingRepo {
        type Role = Role;

        async fn get_by_name(&self, name: &str) -> DbResult<Option<Role>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.get_by_name(name).await
        }

        async fn get_by_id(&self, id: RoleId) -> DbResult<Option<Role>> {
            self.inner.get_by_id(id).await
        }

        async fn get_ids_by_names(&self, names: &[String]) -> DbResult<HashMap<String, RoleId>> {
            self.inner.get_ids_by_names(names).await
        }

        async fn role_ids_of_user(&self, user_id: &str) -> DbResult<Vec<RoleId>> {
            self.inner.role_ids_of_user(user_id).await
        }
    }

    fn counting(roles: Vec<Role>) -> Arc<CountingRepo> {
        Arc::new(CountingRepo {
            inner: MemoryRoleRepo::with_roles(roles),
            lookups: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_init_resolves_super_role() {
        let repo = counting(vec![Role::system(1, "super_admin"), Role::new(2, "author")]);
        let directory = RoleDirectory::new(repo, "super_admin").init().await;
        assert_eq!(directory.super_role_id(), Some(1));
    }

    #[tokio::test]
    async fn test_missing_super_role_is_tolerated_and_retried() {
        let repo = counting(vec![]);
        let directory = RoleDirectory::new(repo.clone(), "super_admin")
            .with_negative_cache_ttl(Duration::from_secs(3600))
            .init()
            .await;
        assert_eq!(directory.super_role_id(), None);

        repo.inner.insert_role(Role::system(9, "super_admin")).await;
        // Within the negative-cache window no query is made
        let before = repo.lookups.load(Ordering::SeqCst);
        assert_eq!(directory.ensure_super_role().await, None);
        assert_eq!(repo.lookups.load(Ordering::SeqCst), before);

        // An explicit reload picks it up
        assert_eq!(directory.reload_super_role().await.unwrap(), Some(9));
        assert_eq!(directory.ensure_super_role().await, Some(9));
    }

    #[tokio::test]
    async fn test_ensure_super_role_retries_after_ttl() {
        let repo = counting(vec![]);
        let directory = RoleDirectory::new(repo.clone(), "super_admin")
            .with_negative_cache_ttl(Duration::ZERO)
            .init()
            .await;

        repo.inner.insert_role(Role::system(9, "super_admin")).await;
        assert_eq!(directory.ensure_super_role().await, Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_super_role_retry_waits_for_negative_ttl() {
        let repo = counting(vec![]);
        let directory = RoleDirectory::new(repo.clone(), "super_admin").init().await;
        repo.inner.insert_role(Role::system(9, "super_admin")).await;

        tokio::time::advance(DEFAULT_NEGATIVE_CACHE_TTL - Duration::from_secs(1)).await;
        assert_eq!(directory.ensure_super_role().await, None);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(directory.ensure_super_role().await, Some(9));
    }

    #[tokio::test]
    async fn test_role_id_by_name_caches_hits_and_misses() {
        let repo = counting(vec![Role::new(2, "author")]);
        let directory = RoleDirectory::new(repo.clone(), "super_admin")
            .with_negative_cache_ttl(Duration::from_secs(3600));

        assert_eq!(directory.role_id_by_name("author").await.unwrap(), Some(2));
        assert_eq!(directory.role_id_by_name("author").await.unwrap(), Some(2));
        assert_eq!(directory.role_id_by_name("ghost").await.unwrap(), None);
        assert_eq!(directory.role_id_by_name("ghost").await.unwrap(), None);
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 2);

        directory.invalidate();
        assert_eq!(directory.role_id_by_name("author").await.unwrap(), Some(2));
        assert_eq!(repo.lookups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_names_and_ids_conversions() {
        let repo = counting(vec![
            Role::new(1, "reader"),
            Role::new(2, "author"),
            Role::new(3, "editor"),
        ]);
        let directory = RoleDirectory::new(repo, "super_admin");

        let ids = directory
            .role_ids_by_names(&["author".into(), "ghost".into(), "editor".into()])
            .await
            .unwrap();
        assert_eq!(ids, vec![2, 3]);

        let names = directory.role_names_by_ids(&[3, 1, 42]).await.unwrap();
        assert_eq!(names, vec!["editor", "reader"]);
    }
}
