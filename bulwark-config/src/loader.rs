//! Configuration loading and environment variable handling

use std::path::Path;
use std::str::FromStr;

use crate::domains::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::domains::BulwarkConfig;
use crate::error::{ConfigError, ConfigResult};

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "BULWARK".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<BulwarkConfig> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        self.from_yaml(&content)
    }

    /// Load configuration from YAML text with environment overrides
    pub fn from_yaml(&self, content: &str) -> ConfigResult<BulwarkConfig> {
        let mut config: BulwarkConfig = serde_yaml::from_str(content)?;

        // Apply environment variable overrides
        self.apply_env_overrides(&mut config)?;

        // Validate all domains
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<BulwarkConfig> {
        let mut config = BulwarkConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<BulwarkConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut BulwarkConfig) -> ConfigResult<()> {
        self.apply_logging_overrides(&mut config.logging)?;

        if let Ok(max_concurrency) = self.get_env_var("MAX_CONCURRENCY") {
            let max_concurrency: usize = max_concurrency
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid MAX_CONCURRENCY: {}", e)))?;
            config.execution.max_concurrency = Some(max_concurrency);
        }

        if let Ok(timeout) = self.get_env_var("TIMEOUT") {
            let timeout = humantime::parse_duration(&timeout)
                .map_err(|e| ConfigError::EnvError(format!("Invalid TIMEOUT: {}", e)))?;
            config.policies.timeout = Some(timeout);
        }

        if let Ok(max_attempts) = self.get_env_var("RETRY_MAX_ATTEMPTS") {
            let max_attempts: u32 = max_attempts.parse().map_err(|e| {
                ConfigError::EnvError(format!("Invalid RETRY_MAX_ATTEMPTS: {}", e))
            })?;
            config
                .policies
                .retry
                .get_or_insert_with(Default::default)
                .max_attempts = max_attempts;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(&self, config: &mut LoggingConfig) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
