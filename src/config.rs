//! Configuration management for the Vergo rate limiter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, VergoError};
use crate::ratelimit::{LimiterSettings, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

/// Prefix for environment overrides, e.g. `VERGO__RATE_LIMITING__WINDOW_MS`.
const ENV_PREFIX: &str = "VERGO";
const ENV_SEPARATOR: &str = "__";

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VergoConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests per window when a caller does not name a limit
    #[serde(default = "default_max_requests")]
    pub default_max_requests: u32,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            default_max_requests: default_max_requests(),
        }
    }
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW.as_millis() as u64
}

fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

impl From<&RateLimitingConfig> for LimiterSettings {
    fn from(config: &RateLimitingConfig) -> Self {
        LimiterSettings {
            window: Duration::from_millis(config.window_ms),
            default_max_requests: config.default_max_requests,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl VergoConfig {
    /// Load layered configuration: defaults, then the optional YAML file,
    /// then `VERGO__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, env_source())
    }

    fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: VergoConfig = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: VergoConfig = serde_yaml::from_str(yaml)
            .map_err(|e| VergoError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.window_ms == 0 {
            return Err(VergoError::Config(
                "rate_limiting.window_ms must be greater than zero".to_string(),
            ));
        }
        if self.rate_limiting.default_max_requests == 0 {
            return Err(VergoError::Config(
                "rate_limiting.default_max_requests must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Limiter settings derived from this configuration.
    pub fn limiter_settings(&self) -> LimiterSettings {
        LimiterSettings::from(&self.rate_limiting)
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
