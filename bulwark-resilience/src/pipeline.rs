//! Configurable policy stack
//!
//! A [`PolicyStack`] is the serde form of a decorator chain. Building it
//! validates every section and creates the stateful parts (limiter, breaker)
//! once, so every task the resulting [`Pipeline`] decorates shares them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use bulwark_core::{Result, Task, TaskError};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::retry::{self, BackoffPolicy};
use crate::timeout::wrap_timeout;

/// Policy sections, all optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyStack {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<BackoffPolicy>,

    /// Bound on the whole call, retries included
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Bound on each individual attempt
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub attempt_timeout: Option<Duration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl PolicyStack {
    /// A stack with every section filled in, used for sample configuration
    pub fn recommended() -> Self {
        Self {
            retry: Some(BackoffPolicy::default()),
            timeout: Some(Duration::from_secs(30)),
            attempt_timeout: Some(Duration::from_secs(10)),
            rate_limit: Some(
                RateLimitConfig::new(crate::Rate::per_second(50))
                    .with_burst(100)
                    .with_max_wait(Duration::from_secs(5)),
            ),
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.retry.is_none()
            && self.timeout.is_none()
            && self.attempt_timeout.is_none()
            && self.rate_limit.is_none()
            && self.circuit_breaker.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(TaskError::validation("timeout must be greater than zero"));
        }
        if self.attempt_timeout == Some(Duration::ZERO) {
            return Err(TaskError::validation(
                "attempt_timeout must be greater than zero",
            ));
        }
        if let Some(rate_limit) = &self.rate_limit {
            rate_limit.validate()?;
        }
        if let Some(circuit_breaker) = &self.circuit_breaker {
            circuit_breaker.validate()?;
        }
        Ok(())
    }

    /// Validate the stack and create its shared limiter and breaker
    pub fn build(&self) -> Result<Pipeline> {
        self.validate()?;

        Ok(Pipeline {
            retry: self.retry.clone(),
            timeout: self.timeout,
            attempt_timeout: self.attempt_timeout,
            rate_limiter: self.rate_limit.clone().map(RateLimiter::new).transpose()?,
            circuit_breaker: self
                .circuit_breaker
                .clone()
                .map(CircuitBreaker::new)
                .transpose()?,
        })
    }
}

/// A built [`PolicyStack`]
#[derive(Debug, Clone)]
pub struct Pipeline {
    retry: Option<BackoffPolicy>,
    timeout: Option<Duration>,
    attempt_timeout: Option<Duration>,
    rate_limiter: Option<RateLimiter>,
    circuit_breaker: Option<CircuitBreaker>,
}

impl Pipeline {
    /// Decorate `task`.
    ///
    /// Innermost first: attempt timeout, rate limit, circuit breaker, retry,
    /// overall timeout. Every retry attempt takes its own token, and calls the
    /// breaker rejects take none.
    pub fn apply(&self, task: &Task) -> Task {
        let mut task = task.clone();

        if let Some(after) = self.attempt_timeout {
            task = wrap_timeout(&task, after);
        }
        if let Some(limiter) = &self.rate_limiter {
            task = limiter.wrap(&task);
        }
        if let Some(breaker) = &self.circuit_breaker {
            task = breaker.wrap(&task);
        }
        if let Some(policy) = &self.retry {
            task = retry::retry(&task, policy.clone());
        }
        if let Some(after) = self.timeout {
            task = wrap_timeout(&task, after);
        }

        task
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_ref()
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.circuit_breaker.as_ref()
    }
}
