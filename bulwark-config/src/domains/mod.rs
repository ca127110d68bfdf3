//! Domain-specific configuration modules

pub mod logging;
pub mod policies;

use bulwark_execution::ExecutorConfig;
use bulwark_resilience::PolicyStack;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::validation::Validatable;

/// Main Bulwark configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BulwarkConfig {
    /// Decorators applied to every task
    pub policies: PolicyStack,

    /// Executor settings
    pub execution: ExecutorConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl BulwarkConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        Validatable::validate(&self.policies)?;
        Validatable::validate(&self.execution)?;
        self.logging.validate()?;

        if let (Some(attempt), Some(total)) =
            (self.policies.attempt_timeout, self.policies.timeout)
        {
            if attempt > total {
                return Err(ConfigError::ValidationError(format!(
                    "policies.attempt_timeout ({}) exceeds policies.timeout ({})",
                    humantime::format_duration(attempt),
                    humantime::format_duration(total)
                )));
            }
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = BulwarkConfig {
            policies: PolicyStack::recommended(),
            execution: ExecutorConfig {
                max_concurrency: Some(64),
            },
            logging: logging::LoggingConfig::default(),
        };
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
