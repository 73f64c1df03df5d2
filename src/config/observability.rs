use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Directives appended when no `filter` is configured.
const DEFAULT_DIRECTIVES: &str = "hyper=warn,tower=info,tower_http=info";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Subscriber settings for the server binary.
///
/// Decision and cache events are emitted at `debug`, so
/// `filter = "routeguard=debug"` is the usual way to audit denials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default = "default_timestamps")]
    pub timestamps: bool,

    /// Include source file and line in each event.
    #[serde(default)]
    pub file_line: bool,

    /// Extra `target=level` directives, comma separated.
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            timestamps: default_timestamps(),
            file_line: false,
            filter: None,
        }
    }
}

fn default_timestamps() -> bool {
    true
}

impl LoggingConfig {
    /// The configured level followed by the filter directives.
    pub fn directives(&self) -> String {
        let extra = self
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_DIRECTIVES);
        format!("{},{}", self.level.as_str(), extra)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let Some(filter) = self.filter.as_deref() else {
            return Ok(());
        };
        for directive in filter.split(',').map(str::trim) {
            if directive.is_empty() || directive.contains(char::is_whitespace) {
                return Err(ConfigError::Validation(format!(
                    "observability.logging.filter has an invalid directive '{}'",
                    directive
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, for local development.
    Pretty,
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_default_quiets_http_stack() {
        let config = LoggingConfig::default();
        assert_eq!(config.directives(), "info,hyper=warn,tower=info,tower_http=info");
    }

    #[test]
    fn test_directives_with_filter() {
        let config = LoggingConfig {
            level: LogLevel::Warn,
            filter: Some(" routeguard=debug ".into()),
            ..Default::default()
        };
        assert_eq!(config.directives(), "warn,routeguard=debug");
    }

    #[test]
    fn test_validate_rejects_blank_directives() {
        let config = LoggingConfig {
            filter: Some("routeguard=debug,,tower=warn".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LoggingConfig {
            filter: Some("routeguard=debug, tower_http=warn".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
