use serde::{Deserialize, Serialize};

use super::{HasId, HasName, IsSystem};

/// Stable numeric role identifier.
pub type RoleId = u64;

/// Name of the distinguished role whose holders bypass every rule.
pub const DEFAULT_SUPER_ROLE: &str = "super_admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// System roles cannot be created, deleted, or have their membership
    /// changed through the administrative surface.
    #[serde(default)]
    pub is_system: bool,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_system: false,
        }
    }

    pub fn system(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_system: true,
        }
    }
}

impl HasId for Role {
    type Id = RoleId;

    fn id(&self) -> RoleId {
        self.id
    }
}

impl HasName for Role {
    fn name(&self) -> &str {
        &self.name
    }
}

impl IsSystem for Role {
    fn is_system(&self) -> bool {
        self.is_system
    }
}
