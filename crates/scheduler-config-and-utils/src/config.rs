//! Configuration management for the publisher and CLI.

use crate::{CoreError, CoreResult, Paths, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Attempts before an event is parked in the error state.
pub const DEFAULT_MAX_PUBLISH_ATTEMPTS: u32 = 5;
/// Delay after the first failed attempt.
pub const DEFAULT_RETRY_BASE_SECONDS: u64 = 30;
/// Cap on the retry delay.
pub const DEFAULT_RETRY_MAX_SECONDS: u64 = 1800;
/// Interval between publisher cycles.
pub const DEFAULT_PUBLISHER_INTERVAL_SECONDS: u64 = 30;
/// Wait after opening relay connections before the first publish.
pub const DEFAULT_RELAY_SETTLE_MILLIS: u64 = 1250;
/// Per-relay connect timeout.
pub const DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS: u64 = 10;

const ENV_PREFIX: &str = "SCHDLSTR_";

/// Publisher configuration.
///
/// Built once at startup and handed to every component that needs it.
/// Path fields left unset resolve against [`Paths`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// SQLite database holding scheduled events.
    pub database_path: Option<PathBuf>,
    /// JSON array of relay URLs.
    pub relays_path: Option<PathBuf>,
    pub max_publish_attempts: u32,
    pub retry_base_seconds: u64,
    pub retry_max_seconds: u64,
    pub publisher_interval_seconds: u64,
    pub relay_settle_millis: u64,
    pub relay_connect_timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            database_path: None,
            relays_path: None,
            max_publish_attempts: DEFAULT_MAX_PUBLISH_ATTEMPTS,
            retry_base_seconds: DEFAULT_RETRY_BASE_SECONDS,
            retry_max_seconds: DEFAULT_RETRY_MAX_SECONDS,
            publisher_interval_seconds: DEFAULT_PUBLISHER_INTERVAL_SECONDS,
            relay_settle_millis: DEFAULT_RELAY_SETTLE_MILLIS,
            relay_connect_timeout_seconds: DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS,
        }
    }
}

impl Config {
    /// Load configuration from the config file (if any), then apply
    /// `SCHDLSTR_*` environment overrides and validate the result.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production). Unparsable numbers are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        if let Some(path) = var("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("RELAYS_PATH") {
            self.relays_path = Some(PathBuf::from(path));
        }

        override_number(
            &mut self.max_publish_attempts,
            "MAX_PUBLISH_ATTEMPTS",
            var("MAX_PUBLISH_ATTEMPTS"),
        );
        override_number(
            &mut self.retry_base_seconds,
            "RETRY_BASE_SECONDS",
            var("RETRY_BASE_SECONDS"),
        );
        override_number(
            &mut self.retry_max_seconds,
            "RETRY_MAX_SECONDS",
            var("RETRY_MAX_SECONDS"),
        );
        override_number(
            &mut self.publisher_interval_seconds,
            "PUBLISHER_INTERVAL_SECONDS",
            var("PUBLISHER_INTERVAL_SECONDS"),
        );
        override_number(
            &mut self.relay_settle_millis,
            "RELAY_SETTLE_MILLIS",
            var("RELAY_SETTLE_MILLIS"),
        );
        override_number(
            &mut self.relay_connect_timeout_seconds,
            "RELAY_CONNECT_TIMEOUT_SECONDS",
            var("RELAY_CONNECT_TIMEOUT_SECONDS"),
        );
    }

    /// Reject settings the publisher cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_publish_attempts == 0 {
            return Err(CoreError::Config(
                "max_publish_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry_base_seconds == 0 {
            return Err(CoreError::Config(
                "retry_base_seconds must be at least 1".to_string(),
            ));
        }
        if self.retry_max_seconds < self.retry_base_seconds {
            return Err(CoreError::Config(format!(
                "retry_max_seconds ({}) is below retry_base_seconds ({})",
                self.retry_max_seconds, self.retry_base_seconds
            )));
        }
        if self.publisher_interval_seconds == 0 {
            return Err(CoreError::Config(
                "publisher_interval_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Database file, falling back to the default under the base directory.
    pub fn database_path(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }

    /// Relay list file, falling back to the default under the base directory.
    pub fn relays_path(&self, paths: &Paths) -> PathBuf {
        self.relays_path.clone().unwrap_or_else(|| paths.relays_file())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_publish_attempts,
            base: Duration::from_secs(self.retry_base_seconds),
            max_delay: Duration::from_secs(self.retry_max_seconds),
        }
    }

    pub fn publisher_interval(&self) -> Duration {
        Duration::from_secs(self.publisher_interval_seconds)
    }

    pub fn relay_settle_delay(&self) -> Duration {
        Duration::from_millis(self.relay_settle_millis)
    }

    pub fn relay_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_connect_timeout_seconds)
    }
}

fn override_number<T: std::str::FromStr>(target: &mut T, name: &str, raw: Option<String>) {
    let Some(raw) = raw else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!(
            variable = %format!("{}{}", ENV_PREFIX, name),
            value = %raw,
            "Ignoring unparsable environment override"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.max_publish_attempts, 5);
        assert_eq!(config.retry_base_seconds, 30);
        assert_eq!(config.retry_max_seconds, 1800);
        assert_eq!(config.publisher_interval_seconds, 30);
        assert_eq!(config.relay_settle_delay(), Duration::from_millis(1250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "max_publish_attempts": 3 }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_publish_attempts, 3);
        assert_eq!(config.retry_base_seconds, DEFAULT_RETRY_BASE_SECONDS);
    }

    #[test]
    fn test_config_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(paths.config_file(), "{ not json").unwrap();

        assert!(matches!(Config::load(&paths), Err(CoreError::Json(_))));
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            retry_base_seconds: 10,
            ..Config::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(lookup(&[
            ("SCHDLSTR_LOG_LEVEL", "DEBUG"),
            ("SCHDLSTR_DATABASE_PATH", "/tmp/events.db"),
            ("SCHDLSTR_MAX_PUBLISH_ATTEMPTS", "7"),
            ("SCHDLSTR_PUBLISHER_INTERVAL_SECONDS", "5"),
        ]));

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/events.db")));
        assert_eq!(config.max_publish_attempts, 7);
        assert_eq!(config.publisher_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_unparsable_number_ignored() {
        let mut config = Config::default();
        config.apply_env(lookup(&[
            ("SCHDLSTR_RETRY_BASE_SECONDS", "soon"),
            ("SCHDLSTR_RETRY_MAX_SECONDS", ""),
        ]));

        assert_eq!(config.retry_base_seconds, DEFAULT_RETRY_BASE_SECONDS);
        assert_eq!(config.retry_max_seconds, DEFAULT_RETRY_MAX_SECONDS);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_attempts = Config {
            max_publish_attempts: 0,
            ..Config::default()
        };
        assert!(zero_attempts.validate().is_err());

        let inverted = Config {
            retry_base_seconds: 60,
            retry_max_seconds: 30,
            ..Config::default()
        };
        assert!(inverted.validate().is_err());

        let zero_interval = Config {
            publisher_interval_seconds: 0,
            ..Config::default()
        };
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_paths_fall_back_to_base_dir() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config::default();

        assert_eq!(config.database_path(&paths), paths.database_file());
        assert_eq!(config.relays_path(&paths), paths.relays_file());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = Config {
            max_publish_attempts: 3,
            retry_base_seconds: 10,
            retry_max_seconds: 100,
            ..Config::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.next_delay(1), Duration::from_secs(10));
        assert_eq!(policy.next_delay(5), Duration::from_secs(100));
    }
}
