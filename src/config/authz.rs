use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::models::{DEFAULT_SUPER_ROLE, normalize_service_name};

/// Rule cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleCacheConfig {
    /// Load only rules tagged with this service (plus untagged rules).
    /// Truncated to 20 characters.
    #[serde(default)]
    pub service_name: Option<String>,

    /// Refresh the cache when it is older than this.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// How often the background job checks for staleness.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

impl Default for RuleCacheConfig {
    fn default() -> Self {
        Self {
            service_name: None,
            stale_after_secs: default_stale_after(),
            check_interval_secs: default_check_interval(),
        }
    }
}

fn default_stale_after() -> u64 {
    100 * 60
}

fn default_check_interval() -> u64 {
    60
}

impl RuleCacheConfig {
    pub fn service_name(&self) -> Option<String> {
        self.service_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(normalize_service_name)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "rules.check_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Role directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleDirectoryConfig {
    /// Name of the role whose holders bypass every rule.
    #[serde(default = "default_super_role")]
    pub super_role: String,

    /// How long unknown role names (and a missing super-role) are remembered.
    #[serde(default = "default_negative_cache")]
    pub negative_cache_secs: u64,

    /// Request header carrying the role-context selector.
    #[serde(default = "default_context_header")]
    pub context_header: String,
}

impl Default for RoleDirectoryConfig {
    fn default() -> Self {
        Self {
            super_role: default_super_role(),
            negative_cache_secs: default_negative_cache(),
            context_header: default_context_header(),
        }
    }
}

fn default_super_role() -> String {
    DEFAULT_SUPER_ROLE.to_string()
}

fn default_negative_cache() -> u64 {
    60
}

fn default_context_header() -> String {
    "X-Role-Context".to_string()
}

impl RoleDirectoryConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.super_role.trim().is_empty() {
            return Err(ConfigError::Validation("roles.super_role cannot be empty".into()));
        }
        if http::HeaderName::from_bytes(self.context_header.as_bytes()).is_err() {
            return Err(ConfigError::Validation(format!(
                "roles.context_header '{}' is not a valid header name",
                self.context_header
            )));
        }
        Ok(())
    }
}
