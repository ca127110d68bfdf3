//! Resilience patterns for Bulwark
//!
//! Every policy here is a `Task -> Task` decorator: retry with backoff,
//! timeouts, token bucket rate limiting and circuit breaking. They compose
//! by ordinary chaining through [`TaskExt`], or from configuration through
//! [`PolicyStack`].

pub mod backoff;
pub mod circuit_breaker;
pub mod ext;
pub mod pipeline;
pub mod rate_limit;
pub mod retry;
pub mod timeout;

// Re-export commonly used types
pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use circuit_breaker::{
    Admission, CallGuard, CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig,
    CircuitMetrics, CircuitState, Outcome,
};
pub use ext::TaskExt;
pub use pipeline::{Pipeline, PolicyStack};
pub use rate_limit::{Rate, RateLimitConfig, RateLimiter};
pub use retry::{retry, BackoffPolicy, RetryDecision, RetryPolicy, Retryable};
pub use timeout::timeout;
