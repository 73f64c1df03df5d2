//! Roles, users and routes loaded into the in-memory stores at startup.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::models::{AccessType, HttpMethod, RoleId, validate_role_names, validate_rule_path};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedConfig {
    #[serde(default)]
    pub roles: Vec<SeedRole>,

    #[serde(default)]
    pub users: Vec<SeedUser>,

    #[serde(default)]
    pub routes: Vec<SeedRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedRole {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub system: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Role names.
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// A code-declared route, see [`crate::routes::RouteSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedRoute {
    pub method: HttpMethod,
    pub path: String,
    #[serde(rename = "type")]
    pub access: AccessType,
    /// Role names.
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default, rename = "override")]
    pub override_existing: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SeedConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let mut names = std::collections::HashSet::new();
        let mut ids = std::collections::HashSet::new();
        for role in &self.roles {
            if !names.insert(role.name.as_str()) || !ids.insert(role.id) {
                return Err(ConfigError::Validation(format!(
                    "seed.roles contains a duplicate role '{}' (id {})",
                    role.name, role.id
                )));
            }
        }

        for route in &self.routes {
            validate_rule_path(&route.path).map_err(|e| {
                ConfigError::Validation(format!("seed.routes path '{}': {}", route.path, e))
            })?;
            validate_role_names(&route.roles).map_err(|e| {
                ConfigError::Validation(format!("seed.routes roles for '{}': {}", route.path, e))
            })?;
        }
        Ok(())
    }
}
