use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    db::{DbResult, RoleRepo},
    models::{Role, RoleId},
};

#[derive(Default)]
struct RoleState {
    roles: HashMap<RoleId, Role>,
    assignments: HashMap<String, Vec<RoleId>>,
}

pub struct MemoryRoleRepo {
    state: RwLock<RoleState>,
}

impl MemoryRoleRepo {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RoleState::default()),
        }
    }

    pub fn with_roles(roles: impl IntoIterator<Item = Role>) -> Self {
        let state = RoleState {
            roles: roles.into_iter().map(|r| (r.id, r)).collect(),
            assignments: HashMap::new(),
        };
        Self {
            state: RwLock::new(state),
        }
    }

    pub async fn insert_role(&self, role: Role) {
        let mut state = self.state.write().await;
        state.roles.insert(role.id, role);
    }

    /// Replace the role assignments of a user.
    pub async fn assign(&self, user_id: &str, role_ids: impl IntoIterator<Item = RoleId>) {
        let mut state = self.state.write().await;
        state
            .assignments
            .insert(user_id.to_string(), role_ids.into_iter().collect());
    }
}

impl Default for MemoryRoleRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleRepo for MemoryRoleRepo {
    type Role = Role;

    async fn get_by_name(&self, name: &str) -> DbResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|r| r.name == name).cloned())
    }

    async fn get_by_id(&self, id: RoleId) -> DbResult<Option<Role>> {
        let state = self.state.read().await;
        Ok(state.roles.get(&id).cloned())
    }

    async fn get_ids_by_names(&self, names: &[String]) -> DbResult<HashMap<String, RoleId>> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .values()
            .filter(|r| names.contains(&r.name))
            .map(|r| (r.name.clone(), r.id))
            .collect())
    }

    async fn role_ids_of_user(&self, user_id: &str) -> DbResult<Vec<RoleId>> {
        let state = self.state.read().await;
        Ok(state.assignments.get(user_id).cloned().unwrap_or_default())
    }
}
