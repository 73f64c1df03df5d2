use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    db::{DbError, DbResult, RuleRepo},
    models::Rule,
};

pub struct MemoryRuleRepo {
    rules: RwLock<HashMap<String, Rule>>,
}

impl MemoryRuleRepo {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: RwLock::new(rules.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }
}

impl Default for MemoryRuleRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleRepo for MemoryRuleRepo {
    async fn list_all(&self, service_name: Option<&str>) -> DbResult<Vec<Rule>> {
        let rules = self.rules.read().await;
        let mut out: Vec<Rule> = rules
            .values()
            .filter(|r| r.applies_to_service(service_name))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn get(&self, id: &str) -> DbResult<Option<Rule>> {
        let rules = self.rules.read().await;
        Ok(rules.get(id).cloned())
    }

    async fn create(&self, rule: Rule) -> DbResult<Rule> {
        let mut rules = self.rules.write().await;
        if rules.contains_key(&rule.id) {
            return Err(DbError::Conflict(format!("Rule '{}' already exists", rule.id)));
        }
        rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    async fn update(&self, rule: Rule) -> DbResult<Rule> {
        let mut rules = self.rules.write().await;
        match rules.get_mut(&rule.id) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(rule)
            }
            None => Err(DbError::NotFound),
        }
    }

    async fn delete(&self, id: &str) -> DbResult<()> {
        let mut rules = self.rules.write().await;
        rules.remove(id).map(|_| ()).ok_or(DbError::NotFound)
    }
}

/// A rule store that is always unreachable.
#[cfg(test)]
pub struct FailingRuleRepo;

#[cfg(test)]
#[async_trait]
impl RuleRepo for FailingRuleRepo {
    async fn list_all(&self, _service_name: Option<&str>) -> DbResult<Vec<Rule>> {
        Err(DbError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _id: &str) -> DbResult<Option<Rule>> {
        Err(DbError::Unavailable("connection refused".into()))
    }

    async fn create(&self, _rule: Rule) -> DbResult<Rule> {
        Err(DbError::Unavailable("connection refused".into()))
    }

    async fn update(&self, _rule: Rule) -> DbResult<Rule> {
        Err(DbError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _id: &str) -> DbResult<()> {
        Err(DbError::Unavailable("connection refused".into()))
    }
}

/// A read-only rule source serving a fixed list.
///
/// Unlike [`MemoryRuleRepo`] it does not key rules by id, so it can hold
/// several rules for the same `(method, path)`.
#[cfg(test)]
pub struct StaticRuleRepo(pub Vec<Rule>);

#[cfg(test)]
#[async_trait]
impl RuleRepo for StaticRuleRepo {
    async fn list_all(&self, service_name: Option<&str>) -> DbResult<Vec<Rule>> {
        Ok(self
            .0
            .iter()
            .filter(|r| r.applies_to_service(service_name))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> DbResult<Option<Rule>> {
        Ok(self.0.iter().find(|r| r.id == id).cloned())
    }

    async fn create(&self, _rule: Rule) -> DbResult<Rule> {
        Err(DbError::Validation("read-only rule source".into()))
    }

    async fn update(&self, _rule: Rule) -> DbResult<Rule> {
        Err(DbError::Validation("read-only rule source".into()))
    }

    async fn delete(&self, _id: &str) -> DbResult<()> {
        Err(DbError::Validation("read-only rule source".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessType, HttpMethod};

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let repo = MemoryRuleRepo::new();
        let rule = Rule::new(HttpMethod::Get, "/api/blogs", AccessType::Public);
        repo.create(rule.clone()).await.unwrap();

        let err = repo.create(rule).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown() {
        let repo = MemoryRuleRepo::new();
        let rule = Rule::new(HttpMethod::Get, "/api/blogs", AccessType::Public);

        assert!(matches!(
            repo.update(rule).await.unwrap_err(),
            DbError::NotFound
        ));
        assert!(matches!(
            repo.delete("GET|/nope").await.unwrap_err(),
            DbError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_list_all_filters_by_service() {
        let repo = MemoryRuleRepo::with_rules([
            Rule::new(HttpMethod::Get, "/shared", AccessType::Public),
            Rule::new(HttpMethod::Get, "/blog", AccessType::Public).with_service("blog"),
            Rule::new(HttpMethod::Get, "/billing", AccessType::Public).with_service("billing"),
        ]);

        let blog: Vec<String> = repo
            .list_all(Some("blog"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(blog, vec!["/blog", "/shared"]);

        assert_eq!(repo.list_all(None).await.unwrap().len(), 3);
    }
}
