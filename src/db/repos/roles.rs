use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{HasId, HasName, IsSystem, RoleId},
};

#[async_trait]
pub trait RoleRepo: Send + Sync {
    /// Application role type.
    type Role: HasId<Id = RoleId> + HasName + IsSystem + Clone + Send + Sync;

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Self::Role>>;

    async fn get_by_id(&self, id: RoleId) -> DbResult<Option<Self::Role>>;

    /// Resolve many names in one query. Unknown names are absent from the map.
    async fn get_ids_by_names(&self, names: &[String]) -> DbResult<HashMap<String, RoleId>>;

    /// Role ids currently assigned to a user.
    ///
    /// Only used for tokens that predate embedded role ids.
    async fn role_ids_of_user(&self, user_id: &str) -> DbResult<Vec<RoleId>>;
}
