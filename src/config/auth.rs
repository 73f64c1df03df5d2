use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::auth::RoleFormat;

/// Secrets shorter than this are accepted with a warning.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// Access and refresh token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// HMAC secret for signing access tokens.
    #[serde(default)]
    pub secret: String,

    /// Access token lifetime in seconds.
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,

    /// Clock skew tolerated when checking `exp` and `nbf`.
    #[serde(default)]
    pub leeway_secs: u64,

    /// Which role representation to embed in tokens.
    #[serde(default)]
    pub role_format: RoleFormat,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            leeway_secs: 0,
            role_format: RoleFormat::default(),
        }
    }
}

fn default_access_ttl() -> u64 {
    24 * 60 * 60
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 60 * 60
}

impl TokenConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::from_secs(self.access_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_secs)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.access_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.access_ttl_secs must be greater than 0".into(),
            ));
        }
        if self.refresh_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.refresh_ttl_secs must be greater than 0".into(),
            ));
        }
        if !self.secret.is_empty() && self.secret.len() < RECOMMENDED_SECRET_LEN {
            tracing::warn!(
                length = self.secret.len(),
                recommended = RECOMMENDED_SECRET_LEN,
                "auth.secret is shorter than recommended"
            );
        }
        Ok(())
    }

    /// The signing secret, failing when none is configured.
    pub fn require_secret(&self) -> Result<&str, ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::Validation(
                "auth.secret must be set to sign tokens".into(),
            ));
        }
        Ok(&self.secret)
    }
}

/// Refresh token housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshTokenConfig {
    /// How often expired refresh tokens are deleted.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for RefreshTokenConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    3600
}

impl RefreshTokenConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
