//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFGRID_*)
//! 2. TOML config file (if OFFGRID_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFGRID_*)
/// 2. TOML config file (if OFFGRID_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding caches, the retry queue and persistent flags.
    ///
    /// Set via OFFGRID_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the hosting application.
    ///
    /// Relative request URLs resolve against it and it decides the same-origin flag.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Hard transport timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Race timer for network-first routes, in seconds.
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,

    /// How long a queued mutation stays replayable, in hours.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Forced reloads allowed per session before the host gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before a forced reload, in milliseconds.
    #[serde(default = "default_reload_delay_ms")]
    pub reload_delay_ms: u64,

    /// Window during which malformed-response signals are watched after load.
    #[serde(default = "default_error_watch_ms")]
    pub error_watch_ms: u64,

    /// Interval of the fallback queue drain, in seconds. Zero disables it.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,

    /// Path prefix of the application API.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Resources that must exist for the application shell to be healthy.
    ///
    /// Set via OFFGRID_CRITICAL_RESOURCES environment variable (array syntax, `["/", "/sw.js"]`).
    #[serde(default = "default_critical_resources")]
    pub critical_resources: Vec<String>,

    /// Interceptor script registered with the hosting runtime.
    #[serde(default = "default_script_url")]
    pub script_url: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offgrid-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_user_agent() -> String {
    "offgrid/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_network_timeout_secs() -> u64 {
    3
}

fn default_retention_hours() -> u64 {
    24
}

fn default_max_retries() -> u32 {
    3
}

fn default_reload_delay_ms() -> u64 {
    1_000
}

fn default_error_watch_ms() -> u64 {
    1_000
}

fn default_drain_interval_secs() -> u64 {
    300
}

fn default_api_prefix() -> String {
    "/task".into()
}

fn default_critical_resources() -> Vec<String> {
    vec!["/".into(), "/manifest.webmanifest".into(), "/sw.js".into()]
}

fn default_script_url() -> String {
    "/sw.js".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            network_timeout_secs: default_network_timeout_secs(),
            retention_hours: default_retention_hours(),
            max_retries: default_max_retries(),
            reload_delay_ms: default_reload_delay_ms(),
            error_watch_ms: default_error_watch_ms(),
            drain_interval_secs: default_drain_interval_secs(),
            api_prefix: default_api_prefix(),
            critical_resources: default_critical_resources(),
            script_url: default_script_url(),
        }
    }
}

/// Longest retention window a queued mutation may have (one year).
pub const MAX_RETENTION_HOURS: u64 = 8760;

impl AppConfig {
    /// Transport timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    /// Retention window, clamped to [`MAX_RETENTION_HOURS`].
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours.min(MAX_RETENTION_HOURS) as i64)
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }

    pub fn error_watch_window(&self) -> Duration {
        Duration::from_millis(self.error_watch_ms)
    }

    /// Fallback drain interval, `None` when disabled.
    pub fn drain_interval(&self) -> Option<Duration> {
        (self.drain_interval_secs > 0).then(|| Duration::from_secs(self.drain_interval_secs))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFGRID_`
    /// 2. TOML file from `OFFGRID_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment()
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFGRID_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("OFFGRID_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./offgrid-cache.sqlite"));
        assert_eq!(config.user_agent, "offgrid/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.network_timeout_secs, 3);
        assert_eq!(config.retention_hours, 24);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.api_prefix, "/task");
        assert_eq!(config.critical_resources.len(), 3);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.network_timeout(), Duration::from_secs(3));
        assert_eq!(config.retention(), chrono::Duration::hours(24));
        assert_eq!(config.reload_delay(), Duration::from_secs(1));
        assert_eq!(config.drain_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_drain_interval_disabled() {
        let config = AppConfig { drain_interval_secs: 0, ..Default::default() };
        assert_eq!(config.drain_interval(), None);
    }

    #[test]
    fn test_env_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("OFFGRID_MAX_RETRIES", "5");
            jail.set_env("OFFGRID_API_PREFIX", "/api");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.max_retries, 5);
            assert_eq!(config.api_prefix, "/api");
            assert_eq!(config.retention_hours, 24);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_layer() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("offgrid.toml", "retention_hours = 48\norigin = \"https://tasks.example\"")?;
            jail.set_env("OFFGRID_CONFIG_FILE", "offgrid.toml");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.retention_hours, 48);
            assert_eq!(config.origin, "https://tasks.example");
            Ok(())
        });
    }
}
