//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, MAX_RETENTION_HOURS};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `network_timeout_secs` is outside 1..=60
    /// - `retention_hours` is 0 or longer than a year
    /// - `max_retries` is outside 1..=10
    /// - `origin` is not an http(s) URL
    /// - `api_prefix` does not start with `/`
    /// - `user_agent` is empty
    ///
    /// Returns `ConfigError::Missing` if `script_url` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if !(1..=60).contains(&self.network_timeout_secs) {
            return Err(ConfigError::Invalid {
                field: "network_timeout_secs".into(),
                reason: "must be between 1 and 60 seconds".into(),
            });
        }

        if !(1..=MAX_RETENTION_HOURS).contains(&self.retention_hours) {
            return Err(ConfigError::Invalid {
                field: "retention_hours".into(),
                reason: format!("must be between 1 and {MAX_RETENTION_HOURS}"),
            });
        }

        if !(1..=10).contains(&self.max_retries) {
            return Err(ConfigError::Invalid { field: "max_retries".into(), reason: "must be between 1 and 10".into() });
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") => {}
            Ok(origin) => {
                return Err(ConfigError::Invalid {
                    field: "origin".into(),
                    reason: format!("unsupported scheme: {}", origin.scheme()),
                });
            }
            Err(e) => return Err(ConfigError::Invalid { field: "origin".into(), reason: e.to_string() }),
        }

        if !self.api_prefix.starts_with('/') {
            return Err(ConfigError::Invalid { field: "api_prefix".into(), reason: "must start with '/'".into() });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.script_url.is_empty() {
            return Err(ConfigError::Missing {
                field: "script_url".into(),
                hint: "Set OFFGRID_SCRIPT_URL to the interceptor script path".into(),
            });
        }

        if self.critical_resources.is_empty() {
            tracing::warn!("critical_resources is empty; integrity checks will always pass");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { timeout_ms: 301_000, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_network_timeout_bounds() {
        let config = AppConfig { network_timeout_secs: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "network_timeout_secs"));

        let config = AppConfig { network_timeout_secs: 61, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "network_timeout_secs"));
    }

    #[test]
    fn test_validate_zero_retention() {
        let config = AppConfig { retention_hours: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "retention_hours"));
    }

    #[test]
    fn test_validate_retention_upper_bound() {
        let config = AppConfig { retention_hours: MAX_RETENTION_HOURS, ..Default::default() };
        assert!(config.validate().is_ok());

        let config = AppConfig { retention_hours: MAX_RETENTION_HOURS + 1, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "retention_hours"));

        let config = AppConfig { retention_hours: u64::MAX, ..Default::default() };
        assert!(config.validate().is_err());
        assert_eq!(config.retention(), chrono::Duration::hours(MAX_RETENTION_HOURS as i64));
    }

    #[test]
    fn test_validate_max_retries_bounds() {
        let config = AppConfig { max_retries: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "max_retries"));

        let config = AppConfig { max_retries: 11, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "max_retries"));
    }

    #[test]
    fn test_validate_origin() {
        let config = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "origin"));

        let config = AppConfig { origin: "ftp://files.example".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "origin"));
    }

    #[test]
    fn test_validate_api_prefix() {
        let config = AppConfig { api_prefix: "task".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "api_prefix"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "user_agent"));
    }

    #[test]
    fn test_validate_missing_script_url() {
        let config = AppConfig { script_url: String::new(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Missing { field, .. }) if field == "script_url"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { timeout_ms: 100, network_timeout_secs: 60, max_retries: 10, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
