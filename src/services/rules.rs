use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use crate::{
    authz::{CacheInvalidator, DynRoleRepo, RoleDirectory},
    db::{DbError, RoleRepo, RuleRepo},
    models::{AccessType, HttpMethod, RoleId, Rule, validate_role_names, validate_rule_path},
};

#[derive(Debug, Error)]
pub enum RuleServiceError {
    #[error("Rule '{0}' is declared in code and cannot be modified")]
    FixedRule(String),

    #[error("Rule not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(DbError),
}

impl From<DbError> for RuleServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => Self::NotFound,
            DbError::Conflict(msg) => Self::Conflict(msg),
            DbError::Validation(msg) => Self::Validation(msg),
            other => Self::Storage(other),
        }
    }
}

/// Request to create a rule
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRule {
    pub method: HttpMethod,
    #[validate(custom(function = "validate_rule_path"))]
    pub path: String,
    #[serde(rename = "type")]
    pub access: AccessType,
    /// Role names
    #[serde(default)]
    #[validate(custom(function = "validate_role_names"))]
    pub roles: Vec<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// Request to update a rule. Method and path form the id and cannot change.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateRule {
    #[serde(default, rename = "type")]
    pub access: Option<AccessType>,
    /// Role names (replaces existing roles)
    #[validate(custom(function = "validate_role_names"))]
    pub roles: Option<Vec<String>>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// Administrative rule management.
///
/// Fixed rules belong to code and are rejected for update and delete. Every
/// successful mutation rebuilds the rule cache.
pub struct RuleService<R: RoleRepo + ?Sized = DynRoleRepo> {
    rules: Arc<dyn RuleRepo>,
    roles: Arc<RoleDirectory<R>>,
    cache: Arc<dyn CacheInvalidator>,
    service_name: Option<String>,
}

impl<R: RoleRepo + ?Sized> Clone for RuleService<R> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            roles: self.roles.clone(),
            cache: self.cache.clone(),
            service_name: self.service_name.clone(),
        }
    }
}

impl<R: RoleRepo + ?Sized> RuleService<R> {
    pub fn new(
        rules: Arc<dyn RuleRepo>,
        roles: Arc<RoleDirectory<R>>,
        cache: Arc<dyn CacheInvalidator>,
        service_name: Option<String>,
    ) -> Self {
        Self {
            rules,
            roles,
            cache,
            service_name: service_name.filter(|s| !s.is_empty()),
        }
    }

    pub async fn add_rule(&self, input: CreateRule) -> Result<Rule, RuleServiceError> {
        input
            .validate()
            .map_err(|e| RuleServiceError::Validation(e.to_string()))?;

        let role_ids = self.resolve_roles(&input.roles).await?;
        let mut rule = Rule::new(input.method, input.path, input.access)
            .with_roles(role_ids)
            .with_description(input.description.unwrap_or_default());
        rule.service_name = self.service_name.clone();

        let rule = self.rules.create(rule).await?;
        tracing::info!(rule_id = %rule.id, access = %rule.access, "Rule created");
        self.invalidate().await;
        Ok(rule)
    }

    pub async fn update_rule(&self, id: &str, input: UpdateRule) -> Result<Rule, RuleServiceError> {
        input
            .validate()
            .map_err(|e| RuleServiceError::Validation(e.to_string()))?;

        let mut rule = self.get_mutable(id).await?;
        if let Some(access) = input.access {
            rule.access = access;
        }
        if let Some(names) = &input.roles {
            rule.roles = self.resolve_roles(names).await?;
        }
        if let Some(description) = input.description {
            rule.description = description;
        }

        let rule = self.rules.update(rule).await?;
        tracing::info!(rule_id = %rule.id, "Rule updated");
        self.invalidate().await;
        Ok(rule)
    }

    pub async fn remove_rule(&self, id: &str) -> Result<(), RuleServiceError> {
        let rule = self.get_mutable(id).await?;
        self.rules.delete(&rule.id).await?;
        tracing::info!(rule_id = %rule.id, "Rule deleted");
        self.invalidate().await;
        Ok(())
    }

    /// Rules visible to this service.
    pub async fn list_rules(&self) -> Result<Vec<Rule>, RuleServiceError> {
        Ok(self.rules.list_all(self.service_name.as_deref()).await?)
    }

    pub async fn get_rule(&self, id: &str) -> Result<Option<Rule>, RuleServiceError> {
        Ok(self.rules.get(id).await?)
    }

    async fn get_mutable(&self, id: &str) -> Result<Rule, RuleServiceError> {
        let rule = self
            .rules
            .get(id)
            .await?
            .ok_or(RuleServiceError::NotFound)?;
        if rule.fixed {
            return Err(RuleServiceError::FixedRule(rule.id));
        }
        Ok(rule)
    }

    async fn resolve_roles(&self, names: &[String]) -> Result<Vec<RoleId>, RuleServiceError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = self
                .roles
                .role_id_by_name(name)
                .await?
                .ok_or_else(|| RuleServiceError::Validation(format!("Unknown role '{}'", name)))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// The write already succeeded, so a failed rebuild is logged and left to
    /// the staleness check.
    async fn invalidate(&self) {
        if let Err(e) = self.cache.invalidate().await {
            tracing::error!(error = %e, "Failed to rebuild rule cache after mutation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        authz::RuleCache,
        db::memory::{MemoryRoleRepo, MemoryRuleRepo},
        models::Role,
    };

    struct Fixture {
        service: RuleService<MemoryRoleRepo>,
        cache: Arc<RuleCache>,
    }

    fn fixture(existing: Vec<Rule>) -> Fixture {
        let rules: Arc<dyn RuleRepo> = Arc::new(MemoryRuleRepo::with_rules(existing));
        let cache = Arc::new(RuleCache::new(rules.clone(), Some("blog".to_string())));
        let roles = Arc::new(RoleDirectory::new(
            Arc::new(MemoryRoleRepo::with_roles([
                Role::new(1, "reader"),
                Role::new(2, "author"),
            ])),
            "super_admin",
        ));
        Fixture {
            service: RuleService::new(rules, roles, cache.clone(), Some("blog".to_string())),
            cache,
        }
    }

    fn create(method: HttpMethod, path: &str, roles: &[&str]) -> CreateRule {
        CreateRule {
            method,
            path: path.to_string(),
            access: AccessType::Allow,
            roles: roles.iter().map(|r| r.to_string()).collect(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_add_rule_is_visible_immediately() {
        let f = fixture(vec![]);
        let rule = f
            .service
            .add_rule(create(HttpMethod::Get, "/api/drafts/*", &["author", "author"]))
            .await
            .unwrap();

        assert_eq!(rule.id, "GET|/api/drafts/*");
        assert_eq!(rule.roles, vec![2]);
        assert_eq!(rule.service_name.as_deref(), Some("blog"));

        let matched = f.cache.find_matching_rules(HttpMethod::Get, "/api/drafts/3");
        assert_eq!(matched, vec![rule]);
    }

    #[tokio::test]
    async fn test_add_rule_rejects_duplicates() {
        let f = fixture(vec![]);
        f.service
            .add_rule(create(HttpMethod::Get, "/api/blogs", &[]))
            .await
            .unwrap();
        let result = f
            .service
            .add_rule(create(HttpMethod::Get, "/api/blogs", &[]))
            .await;
        assert!(matches!(result, Err(RuleServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_add_rule_validates_input() {
        let f = fixture(vec![]);

        let result = f
            .service
            .add_rule(create(HttpMethod::Get, "api/blogs", &[]))
            .await;
        assert!(matches!(result, Err(RuleServiceError::Validation(_))));

        let result = f
            .service
            .add_rule(create(HttpMethod::Get, "/api/blog*", &[]))
            .await;
        assert!(matches!(result, Err(RuleServiceError::Validation(_))));

        let result = f
            .service
            .add_rule(create(HttpMethod::Get, "/api/blogs", &["editor"]))
            .await;
        match result {
            Err(RuleServiceError::Validation(msg)) => assert!(msg.contains("editor")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fixed_rules_are_read_only() {
        let fixed = Rule::new(HttpMethod::Post, "/api/blogs", AccessType::Allow).fixed();
        let f = fixture(vec![fixed]);

        let update = UpdateRule {
            access: Some(AccessType::Public),
            ..Default::default()
        };
        assert!(matches!(
            f.service.update_rule("POST|/api/blogs", update).await,
            Err(RuleServiceError::FixedRule(_))
        ));
        assert!(matches!(
            f.service.remove_rule("POST|/api/blogs").await,
            Err(RuleServiceError::FixedRule(_))
        ));
        assert!(f.service.get_rule("POST|/api/blogs").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let f = fixture(vec![]);
        f.service
            .add_rule(create(HttpMethod::Delete, "/api/blogs/*", &["author"]))
            .await
            .unwrap();

        let update = UpdateRule {
            access: Some(AccessType::Forbid),
            roles: Some(vec!["reader".to_string()]),
            description: Some("Readers cannot delete".to_string()),
        };
        let rule = f
            .service
            .update_rule("DELETE|/api/blogs/*", update)
            .await
            .unwrap();
        assert_eq!(rule.access, AccessType::Forbid);
        assert_eq!(rule.roles, vec![1]);

        let cached = f.cache.find_matching_rules(HttpMethod::Delete, "/api/blogs/1");
        assert_eq!(cached[0].access, AccessType::Forbid);

        f.service.remove_rule("DELETE|/api/blogs/*").await.unwrap();
        assert!(f.cache.find_matching_rules(HttpMethod::Delete, "/api/blogs/1").is_empty());
        assert!(matches!(
            f.service.remove_rule("DELETE|/api/blogs/*").await,
            Err(RuleServiceError::NotFound)
        ));
        assert!(f.service.list_rules().await.unwrap().is_empty());
    }
}
