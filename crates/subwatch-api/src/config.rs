//! Server configuration
//!
//! Loaded from a TOML file; every field has a default so a missing file
//! yields a runnable local server. The monitor settings live under the
//! `[monitor]` table.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use subwatch_core::{ConfigError, MonitorConfig};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "SUBWATCH_CONFIG";

/// Environment variable carrying an extra admin token
pub const ADMIN_TOKEN_ENV: &str = "SUBWATCH_ADMIN_TOKEN";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Public status endpoint quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests per minute per client; also the burst size
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 30,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Bearer tokens accepted on admin routes
    pub admin_tokens: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub log: LogConfig,
    pub monitor: MonitorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            admin_tokens: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            log: LogConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse and validate TOML text
    ///
    /// # Errors
    /// Malformed TOML or an invalid value
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::new("<document>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when no path is given
    ///
    /// # Errors
    /// Unreadable file, malformed TOML or an invalid value
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::new("<file>", format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Append an admin token, ignoring blanks and duplicates
    #[must_use]
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        let token = token.trim();
        if !token.is_empty() && !self.admin_tokens.iter().any(|t| t == token) {
            self.admin_tokens.push(token.to_string());
        }
        self
    }

    /// Apply `SUBWATCH_ADMIN_TOKEN` if set
    #[must_use]
    pub fn apply_env(self) -> Self {
        match std::env::var(ADMIN_TOKEN_ENV) {
            Ok(token) => self.with_admin_token(token),
            Err(_) => self,
        }
    }

    /// Check server and monitor settings
    ///
    /// # Errors
    /// The first invalid field found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::new(
                "rate_limit.requests_per_minute",
                "must be > 0",
            ));
        }
        if self.admin_tokens.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::new("admin_tokens", "tokens must not be blank"));
        }
        self.monitor.validate()
    }

    /// Effective configuration rendered as TOML
    ///
    /// # Errors
    /// Serialization failure
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::new("<document>", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(ServerConfig::from_toml("").unwrap(), ServerConfig::default());
        assert_eq!(ServerConfig::load(None).unwrap(), ServerConfig::default());
    }

    #[test]
    fn nested_monitor_settings() {
        let config = ServerConfig::from_toml(
            r#"
            bind = "0.0.0.0:9000"
            admin_tokens = ["s3cret"]

            [rate_limit]
            requests_per_minute = 20

            [log]
            format = "json"

            [monitor.retry]
            max_attempts = 3

            [monitor.stale.thresholds]
            council_delivery = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.admin_tokens, vec!["s3cret".to_string()]);
        assert_eq!(config.rate_limit.requests_per_minute, 20);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.monitor.retry.max_attempts, 3);
        assert_eq!(config.monitor.stale.thresholds.council_delivery, 15);
        assert_eq!(config.monitor.stale.thresholds.review, 90);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = ServerConfig::from_toml("[rate_limit]\nrequests_per_minute = 0").unwrap_err();
        assert_eq!(err.field, "rate_limit.requests_per_minute");

        let err = ServerConfig::from_toml("[monitor.retry]\nmax_attempts = 0").unwrap_err();
        assert_eq!(err.field, "retry.max_attempts");

        assert!(ServerConfig::from_toml("bind = \"not an address\"").is_err());
    }

    #[test]
    fn admin_tokens_deduplicate() {
        let config = ServerConfig::default()
            .with_admin_token("abc")
            .with_admin_token(" abc ")
            .with_admin_token("");
        assert_eq!(config.admin_tokens, vec!["abc".to_string()]);
    }

    #[test]
    fn renders_back_to_toml() {
        let config = ServerConfig::default().with_admin_token("abc");
        let text = config.to_toml().unwrap();
        assert_eq!(ServerConfig::from_toml(&text).unwrap(), config);
    }
}
