//! Method-style decorators on [`Task`]

use std::time::Duration;

use bulwark_core::{Result, Task};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::retry::{self, BackoffPolicy, RetryPolicy};
use crate::timeout;

/// Chainable decorators.
///
/// Each method returns a new task; the receiver is left untouched. Methods
/// that build a stateful policy give the new task its own limiter or breaker.
/// Use [`RateLimiter::wrap`] or [`CircuitBreaker::wrap`] to share one.
///
/// ```ignore
/// let task = fetch
///     .timeout(Duration::from_secs(1))?
///     .retry(BackoffPolicy::fixed(3, Duration::ZERO));
/// ```
pub trait TaskExt {
    fn retry<P: RetryPolicy>(&self, policy: P) -> Task;

    /// Retry with [`BackoffPolicy::default`]
    fn retry_default(&self) -> Task;

    fn timeout(&self, after: Duration) -> Result<Task>;

    fn rate_limit(&self, config: RateLimitConfig) -> Result<Task>;

    fn circuit_breaker(&self, config: CircuitBreakerConfig) -> Result<Task>;
}

impl TaskExt for Task {
    fn retry<P: RetryPolicy>(&self, policy: P) -> Task {
        retry::retry(self, policy)
    }

    fn retry_default(&self) -> Task {
        retry::retry(self, BackoffPolicy::default())
    }

    fn timeout(&self, after: Duration) -> Result<Task> {
        timeout::timeout(self, after)
    }

    fn rate_limit(&self, config: RateLimitConfig) -> Result<Task> {
        Ok(RateLimiter::new(config)?.wrap(self))
    }

    fn circuit_breaker(&self, config: CircuitBreakerConfig) -> Result<Task> {
        Ok(CircuitBreaker::new(config)?.wrap(self))
    }
}
