use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use super::{RouteRegistry, RouteSpec};
use crate::{
    authz::RuleCache,
    db::{DbError, RoleRepo, RuleRepo},
    models::{RoleId, Rule},
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Route sync failed: {0}")]
    Storage(#[from] DbError),
}

/// What a [`sync_routes`] run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Role names that matched no stored role.
    pub skipped_roles: Vec<String>,
}

/// Write the declared routes into the rule store and refresh `cache`.
///
/// Stored rules in the cache's service scope that no route declares are
/// deleted. Without a service name every stored rule is in scope; with one,
/// only rules tagged with it are, so shared untagged rules survive.
pub async fn sync_routes<R>(
    registry: &RouteRegistry,
    rules: &dyn RuleRepo,
    roles: &R,
    cache: &RuleCache,
) -> Result<SyncReport, SyncError>
where
    R: RoleRepo + ?Sized,
{
    let service_name = cache.service_name();
    let mut report = SyncReport::default();

    let names: Vec<String> = registry
        .iter()
        .flat_map(|r| r.roles.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let role_ids = if names.is_empty() {
        HashMap::new()
    } else {
        roles.get_ids_by_names(&names).await?
    };
    for name in names.iter().filter(|n| !role_ids.contains_key(*n)) {
        tracing::warn!(role = %name, "Route references an unknown role, skipping it");
        report.skipped_roles.push(name.clone());
    }

    let stored: HashMap<String, Rule> = rules
        .list_all(service_name)
        .await?
        .into_iter()
        .map(|r| (r.id.clone(), r))
        .collect();

    for rule in stored.values() {
        let in_scope = match service_name {
            None => true,
            Some(name) => rule.service_name.as_deref() == Some(name),
        };
        if !in_scope || registry.contains(&rule.id) {
            continue;
        }
        match rules.delete(&rule.id).await {
            Ok(()) => {
                tracing::info!(rule_id = %rule.id, "Deleted rule no longer declared in code");
                report.deleted += 1;
            }
            Err(DbError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }

    for route in registry.iter() {
        let rule = to_rule(route, &role_ids, service_name);
        match stored.get(&rule.id) {
            Some(existing) if !route.override_existing || *existing == rule => {
                report.unchanged += 1;
            }
            Some(_) => {
                rules.update(rule).await?;
                report.updated += 1;
            }
            None => match rules.create(rule).await {
                Ok(rule) => {
                    tracing::debug!(rule_id = %rule.id, "Created rule from route declaration");
                    report.created += 1;
                }
                Err(DbError::Conflict(msg)) => {
                    tracing::warn!(
                        rule_id = %route.rule_id(),
                        error = %msg,
                        "Rule exists outside this service scope, leaving it untouched"
                    );
                }
                Err(e) => return Err(e.into()),
            },
        }
    }

    let loaded = cache.refresh().await?;
    tracing::info!(
        routes = registry.len(),
        created = report.created,
        updated = report.updated,
        deleted = report.deleted,
        rules_loaded = loaded,
        "Route sync complete"
    );
    Ok(report)
}

fn to_rule(route: &RouteSpec, role_ids: &HashMap<String, RoleId>, service: Option<&str>) -> Rule {
    let mut rule = Rule::new(route.method, route.path.clone(), route.access)
        .with_roles(route.roles.iter().filter_map(|n| role_ids.get(n).copied()))
        .with_description(route.description.clone());
    rule.fixed = route.fixed;
    rule.service_name = service.map(String::from);
    rule
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        db::memory::{MemoryRoleRepo, MemoryRuleRepo},
        models::{AccessType, HttpMethod, Role},
    };

    fn roles() -> MemoryRoleRepo {
        MemoryRoleRepo::with_roles([
            Role::new(1, "reader"),
            Role::new(2, "author"),
            Role::system(9, "super_admin"),
        ])
    }

    fn registry() -> RouteRegistry {
        let mut registry = RouteRegistry::new();
        registry
            .register(RouteSpec::get("/api/blogs").public())
            .register(RouteSpec::delete("/api/blogs/*").allow(["author", "ghost"]))
            .register(RouteSpec::post("/api/blogs").allow(["author"]).fixed());
        registry
    }

    #[tokio::test]
    async fn test_sync_creates_rules_and_refreshes_cache() {
        let repo = Arc::new(MemoryRuleRepo::new());
        let cache = RuleCache::new(repo.clone(), None);

        let report = sync_routes(&registry(), repo.as_ref(), &roles(), &cache)
            .await
            .unwrap();

        assert_eq!(report.created, 3);
        assert_eq!(report.skipped_roles, vec!["ghost".to_string()]);

        let rule = repo.get("DELETE|/api/blogs/*").await.unwrap().unwrap();
        assert_eq!(rule.roles, vec![2]);
        assert!(repo.get("POST|/api/blogs").await.unwrap().unwrap().fixed);

        let matched = cache.find_matching_rules(HttpMethod::Delete, "/api/blogs/42");
        assert_eq!(matched.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_keeps_stored_rules_unless_overridden() {
        let edited = Rule::new(HttpMethod::Get, "/api/blogs", AccessType::Allow).with_roles([1]);
        let repo = Arc::new(MemoryRuleRepo::with_rules([edited.clone()]));
        let cache = RuleCache::new(repo.clone(), None);

        let report = sync_routes(&registry(), repo.as_ref(), &roles(), &cache)
            .await
            .unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(repo.get("GET|/api/blogs").await.unwrap().unwrap(), edited);

        let mut overriding = RouteRegistry::new();
        overriding.register(RouteSpec::get("/api/blogs").public().override_existing());
        let report = sync_routes(&overriding, repo.as_ref(), &roles(), &cache)
            .await
            .unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(
            repo.get("GET|/api/blogs").await.unwrap().unwrap().access,
            AccessType::Public
        );
    }

    #[tokio::test]
    async fn test_sync_deletes_undeclared_rules() {
        let stale = Rule::new(HttpMethod::Get, "/api/legacy", AccessType::Public);
        let repo = Arc::new(MemoryRuleRepo::with_rules([stale]));
        let cache = RuleCache::new(repo.clone(), None);

        let report = sync_routes(&registry(), repo.as_ref(), &roles(), &cache)
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert!(repo.get("GET|/api/legacy").await.unwrap().is_none());
        assert!(cache.find_matching_rules(HttpMethod::Get, "/api/legacy").is_empty());
    }

    #[tokio::test]
    async fn test_scoped_sync_leaves_other_services_alone() {
        let shared = Rule::new(HttpMethod::Get, "/health", AccessType::Public);
        let other = Rule::new(HttpMethod::Get, "/api/invoices", AccessType::Allow)
            .with_service("billing");
        let own = Rule::new(HttpMethod::Get, "/api/old", AccessType::Allow).with_service("blog");
        let repo = Arc::new(MemoryRuleRepo::with_rules([shared, other, own]));
        let cache = RuleCache::new(repo.clone(), Some("blog".to_string()));

        let report = sync_routes(&registry(), repo.as_ref(), &roles(), &cache)
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert!(repo.get("GET|/api/old").await.unwrap().is_none());
        assert!(repo.get("GET|/health").await.unwrap().is_some());
        assert!(repo.get("GET|/api/invoices").await.unwrap().is_some());
        assert_eq!(
            repo.get("GET|/api/blogs")
                .await
                .unwrap()
                .unwrap()
                .service_name
                .as_deref(),
            Some("blog")
        );
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let repo = Arc::new(MemoryRuleRepo::new());
        let cache = RuleCache::new(repo.clone(), None);
        let registry = registry();

        sync_routes(&registry, repo.as_ref(), &roles(), &cache)
            .await
            .unwrap();
        let second = sync_routes(&registry, repo.as_ref(), &roles(), &cache)
            .await
            .unwrap();

        assert_eq!(second.created, 0);
        assert_eq!(second.deleted, 0);
        assert_eq!(second.unchanged, 3);
    }
}
