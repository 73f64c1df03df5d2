mod auth;
mod authz;
mod observability;
mod seed;
mod server;

use std::path::Path;

pub use auth::*;
pub use authz::*;
pub use observability::*;
pub use seed::*;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root configuration.
///
/// Every section is optional with defaults, so an empty file is valid for
/// embedding; the demo server additionally requires `auth.secret`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteGuardConfig {
    /// Demo server listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Access and refresh token settings.
    #[serde(default)]
    pub auth: TokenConfig,

    /// Rule cache settings.
    #[serde(default)]
    pub rules: RuleCacheConfig,

    /// Role directory settings.
    #[serde(default)]
    pub roles: RoleDirectoryConfig,

    /// Refresh token housekeeping.
    #[serde(default)]
    pub refresh_tokens: RefreshTokenConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Initial data for the in-memory stores.
    #[serde(default)]
    pub seed: SeedConfig,
}

impl RouteGuardConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: RouteGuardConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate()?;
        self.rules.validate()?;
        self.roles.validate()?;
        self.seed.validate()?;
        self.observability.logging.validate()?;

        if self.refresh_tokens.cleanup_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "refresh_tokens.cleanup_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand `${VAR_NAME}` references from the environment.
///
/// References after a `#` on the same line are left untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::RoleFormat,
        models::{AccessType, HttpMethod},
    };

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RouteGuardConfig::from_str("").unwrap();
        assert_eq!(config.auth.access_ttl_secs, 86400);
        assert_eq!(config.auth.refresh_ttl_secs, 7 * 86400);
        assert_eq!(config.auth.role_format, RoleFormat::Ids);
        assert_eq!(config.rules.stale_after_secs, 6000);
        assert_eq!(config.rules.check_interval_secs, 60);
        assert_eq!(config.roles.super_role, "super_admin");
        assert_eq!(config.roles.context_header, "X-Role-Context");
        assert_eq!(config.refresh_tokens.cleanup_interval_secs, 3600);
        assert_eq!(config.server.port, 8080);
        assert!(config.auth.require_secret().is_err());
    }

    #[test]
    fn test_full_config() {
        let config = RouteGuardConfig::from_str(
            r#"
            [auth]
            secret = "0123456789abcdef0123456789abcdef"
            access_ttl_secs = 900
            role_format = "both"

            [rules]
            service_name = "a-very-long-service-name-indeed"

            [[seed.roles]]
            id = 1
            name = "reader"

            [[seed.roles]]
            id = 99
            name = "super_admin"
            system = true

            [[seed.routes]]
            method = "DELETE"
            path = "/api/blogs/*"
            type = "FORBID"
            roles = ["reader"]
            override = true
        "#,
        )
        .unwrap();

        assert_eq!(config.auth.access_ttl_secs, 900);
        assert_eq!(config.auth.role_format, RoleFormat::Both);
        assert_eq!(
            config.rules.service_name().as_deref(),
            Some("a-very-long-service-")
        );
        assert_eq!(config.seed.roles.len(), 2);
        assert!(config.seed.roles[1].system);

        let route = &config.seed.routes[0];
        assert_eq!(route.method, HttpMethod::Delete);
        assert_eq!(route.access, AccessType::Forbid);
        assert!(route.override_existing);
        assert!(!route.fixed);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = RouteGuardConfig::from_str("[auth]\nsecrett = \"x\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let result = RouteGuardConfig::from_str("[auth]\naccess_ttl_secs = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_seed_path_rejected() {
        let result = RouteGuardConfig::from_str(
            r#"
            [[seed.routes]]
            method = "GET"
            path = "api/no-leading-slash"
            type = "PUBLIC"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_duplicate_seed_role_rejected() {
        let result = RouteGuardConfig::from_str(
            r#"
            [[seed.roles]]
            id = 1
            name = "reader"

            [[seed.roles]]
            id = 2
            name = "reader"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_context_header_rejected() {
        let result = RouteGuardConfig::from_str("[roles]\ncontext_header = \"bad header\"\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("ROUTEGUARD_TEST_SECRET", Some("from-env"), || {
            let result = expand_env_vars("secret = \"${ROUTEGUARD_TEST_SECRET}\"").unwrap();
            assert_eq!(result, "secret = \"from-env\"");
        });
    }

    #[test]
    fn test_env_var_in_config() {
        temp_env::with_var(
            "ROUTEGUARD_TEST_SECRET_2",
            Some("0123456789abcdef0123456789abcdef"),
            || {
                let config =
                    RouteGuardConfig::from_str("[auth]\nsecret = \"${ROUTEGUARD_TEST_SECRET_2}\"\n")
                        .unwrap();
                assert_eq!(
                    config.auth.require_secret().unwrap(),
                    "0123456789abcdef0123456789abcdef"
                );
            },
        );
    }

    #[test]
    fn test_missing_env_var() {
        temp_env::with_var_unset("ROUTEGUARD_DEFINITELY_UNSET", || {
            let result = expand_env_vars("secret = \"${ROUTEGUARD_DEFINITELY_UNSET}\"");
            assert!(matches!(
                result,
                Err(ConfigError::EnvVarNotFound(name)) if name == "ROUTEGUARD_DEFINITELY_UNSET"
            ));
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# secret = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# secret = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_env_var_after_comment_ignored() {
        temp_env::with_var("ROUTEGUARD_TEST_PORT", Some("9000"), || {
            let result =
                expand_env_vars("port = ${ROUTEGUARD_TEST_PORT} # was ${NONEXISTENT_VAR}").unwrap();
            assert_eq!(result, "port = 9000 # was ${NONEXISTENT_VAR}");
        });
    }
}
