use async_trait::async_trait;

use crate::{db::error::DbResult, models::Rule};

#[async_trait]
pub trait RuleRepo: Send + Sync {
    /// Full snapshot of the rules visible to `service_name`.
    ///
    /// `None` returns every rule. `Some(name)` returns rules tagged with
    /// `name` plus untagged rules.
    async fn list_all(&self, service_name: Option<&str>) -> DbResult<Vec<Rule>>;

    /// Get a rule by its `METHOD|PATH` id.
    async fn get(&self, id: &str) -> DbResult<Option<Rule>>;

    /// Insert a new rule. Fails with `Conflict` if the id already exists.
    async fn create(&self, rule: Rule) -> DbResult<Rule>;

    /// Replace an existing rule. Fails with `NotFound` if the id is unknown.
    async fn update(&self, rule: Rule) -> DbResult<Rule>;

    /// Delete a rule. Fails with `NotFound` if the id is unknown.
    async fn delete(&self, id: &str) -> DbResult<()>;
}
