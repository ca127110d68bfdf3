//! Policy and execution domains
//!
//! The configuration structs themselves live with the code that uses them;
//! this module only adds configuration-level validation.

use bulwark_execution::ExecutorConfig;
use bulwark_resilience::PolicyStack;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

impl Validatable for PolicyStack {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();

        if let Some(rate_limit) = &self.rate_limit {
            validate_positive(rate_limit.rate.count, "rate_limit.rate.count", domain)?;
            if let Some(burst) = rate_limit.burst {
                validate_positive(burst, "rate_limit.burst", domain)?;
            }
        }

        if let Some(circuit_breaker) = &self.circuit_breaker {
            validate_positive(
                circuit_breaker.failure_threshold,
                "circuit_breaker.failure_threshold",
                domain,
            )?;
        }

        if let Some(retry) = &self.retry {
            if retry.max_attempts == 0 {
                log::warn!("retry.max_attempts is 0; tasks will not be retried");
            }
        }

        // Everything else is checked by the policies themselves.
        PolicyStack::validate(self).map_err(|e| self.validation_error(e.to_string()))
    }

    fn domain_name(&self) -> &'static str {
        "policies"
    }
}

impl Validatable for ExecutorConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(max_concurrency) = self.max_concurrency {
            validate_positive(max_concurrency, "max_concurrency", self.domain_name())?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}
