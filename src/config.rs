// Configuration File Support
//
// TOML configuration for the rate limiting service, with environment variable
// overrides. Loaded from the XDG config directory by default:
// ~/.config/cloudengineered/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::rate_limit::RateLimitConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Seconds between sweeps of expired windows
    pub purge_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            purge_interval_secs: 300,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose /metrics/
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;

            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/cloudengineered/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "cloudengineered", "CloudEngineered")
        {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("cloudengineered")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - CLOUDENGINEERED_LOG_LEVEL
    /// - CLOUDENGINEERED_LOG_FORMAT
    /// - CLOUDENGINEERED_PORT
    /// - CLOUDENGINEERED_METRICS_ENABLED
    /// - CLOUDENGINEERED_RATE_LIMIT_ENABLED
    /// - CLOUDENGINEERED_FAILURE_MODE
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("CLOUDENGINEERED_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CLOUDENGINEERED_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(port) = std::env::var("CLOUDENGINEERED_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.server.port = port;
                }
            }
        }

        if let Ok(enabled) = std::env::var("CLOUDENGINEERED_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }

        self.rate_limit = self.rate_limit.apply_env_overrides();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.server.host.is_empty() {
            anyhow::bail!("Server host must not be empty");
        }
        if self.server.purge_interval_secs == 0 {
            anyhow::bail!("Purge interval must be > 0");
        }

        self.rate_limit
            .validate()
            .context("Invalid rate_limit configuration")?;

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{EndpointClass, FailureMode, QuotaTable, UserTier};
    use std::sync::{Mutex, MutexGuard};
    use tempfile::NamedTempFile;

    // Tests touching process environment run one at a time
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 6] = [
        "CLOUDENGINEERED_LOG_LEVEL",
        "CLOUDENGINEERED_LOG_FORMAT",
        "CLOUDENGINEERED_PORT",
        "CLOUDENGINEERED_METRICS_ENABLED",
        "CLOUDENGINEERED_RATE_LIMIT_ENABLED",
        "CLOUDENGINEERED_FAILURE_MODE",
    ];

    fn clear_env() -> MutexGuard<'static, ()> {
        let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        guard
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.server.port, 8080);
        assert!(config.metrics.enabled);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_purge_interval() {
        let mut config = Config::default();
        config.server.purge_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_quotas() {
        let mut config = Config::default();
        config.rate_limit.quotas.staff.api = Some(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let config = Config::default();
        assert_eq!(config.log_level().unwrap(), tracing::Level::INFO);
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let _guard = clear_env();
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("nonexistent");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_valid_toml_config() {
        let _guard = clear_env();

        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging]
level = "debug"
format = "json"

[server]
port = 9000

[rate_limit]
failure_mode = "closed"
trust_forwarded_for = false

[rate_limit.quotas.anonymous]
default = 60
api = 30
search = 20
view = 120
burst = 10
"#;

        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.rate_limit.failure_mode, FailureMode::Closed);
        assert!(!config.rate_limit.trust_forwarded_for);

        let table = QuotaTable::resolve(&config.rate_limit);
        assert_eq!(table.rate_limit(UserTier::Anonymous, EndpointClass::Api), 30);
        assert_eq!(table.burst_limit(UserTier::Anonymous), 10);
        assert_eq!(
            table.rate_limit(UserTier::Authenticated, EndpointClass::Api),
            200
        );
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging
level = "debug"
"#;

        fs::write(temp_file.path(), toml_content).unwrap();
        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_tier_field() {
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[rate_limit.quotas.premium]
serach = 500
"#;

        fs::write(temp_file.path(), toml_content).unwrap();
        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = clear_env();

        std::env::set_var("CLOUDENGINEERED_LOG_LEVEL", "debug");
        std::env::set_var("CLOUDENGINEERED_LOG_FORMAT", "json");
        std::env::set_var("CLOUDENGINEERED_PORT", "9100");
        std::env::set_var("CLOUDENGINEERED_FAILURE_MODE", "closed");
        std::env::set_var("CLOUDENGINEERED_RATE_LIMIT_ENABLED", "false");

        let config = Config::default().apply_env_overrides();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.rate_limit.failure_mode, FailureMode::Closed);
        assert!(!config.rate_limit.enabled);

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_env_overrides_invalid_values() {
        let _guard = clear_env();

        std::env::set_var("CLOUDENGINEERED_PORT", "0");
        std::env::set_var("CLOUDENGINEERED_FAILURE_MODE", "sideways");

        let config = Config::default().apply_env_overrides();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rate_limit.failure_mode, FailureMode::Open);

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }
}
