//! Retry policy and decorator

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use bulwark_core::{Context, Result, Task, TaskError};

use crate::backoff::{BackoffCalculator, BackoffStrategy};

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `after`, then invoke the task again
    Retry { after: Duration },
    /// Attempt budget spent; fail with [`TaskError::RetryExhausted`]
    Exhausted,
    /// The error is not worth retrying; return it unchanged
    Abort,
}

/// Decides whether a failed attempt should be retried.
///
/// `attempt` is 1-based and strictly increasing within one retry sequence.
/// Implementations must be pure: the same inputs give the same decision
/// (up to jitter).
pub trait RetryPolicy: Send + Sync + 'static {
    fn decide(&self, attempt: u32, error: &TaskError) -> RetryDecision;

    /// Total attempt budget, if the policy has a fixed one
    fn max_attempts(&self) -> Option<u32> {
        None
    }
}

impl<F> RetryPolicy for F
where
    F: Fn(u32, &TaskError) -> RetryDecision + Send + Sync + 'static,
{
    fn decide(&self, attempt: u32, error: &TaskError) -> RetryDecision {
        self(attempt, error)
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;

    /// Delay the error itself asks for, overriding the backoff schedule
    fn retry_delay(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for TaskError {
    fn is_retryable(&self) -> bool {
        TaskError::is_retryable(self)
    }

    fn retry_delay(&self) -> Option<Duration> {
        match self {
            TaskError::RateLimitExceeded { retry_after } | TaskError::CircuitOpen { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

/// Backoff-driven retry policy, the default for [`crate::TaskExt::retry_default`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failure
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Backoff strategy
    pub backoff_strategy: BackoffStrategy,

    /// Whether to add ±20% jitter to retry delays
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_strategy: BackoffStrategy::Exponential { base: 2.0 },
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Create a conservative retry policy for critical operations
    pub fn conservative() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_strategy: BackoffStrategy::Exponential { base: 1.5 },
            jitter: true,
        }
    }

    /// Create an aggressive retry policy for fast operations
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_strategy: BackoffStrategy::Exponential { base: 1.2 },
            jitter: true,
        }
    }

    /// Same delay between every attempt, no jitter
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
        }
    }

    /// Delay grows by `delay` after every attempt, no jitter
    pub fn linear(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay * max_attempts.max(1),
            backoff_strategy: BackoffStrategy::Linear,
            jitter: false,
        }
    }

    /// Calculate delay for a specific attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        BackoffCalculator::new(
            self.backoff_strategy.clone(),
            self.initial_delay,
            self.max_delay,
            self.jitter,
        )
        .calculate_delay(attempt)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_delay > self.max_delay {
            return Err(TaskError::validation(format!(
                "retry initial_delay ({:?}) exceeds max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }

        match &self.backoff_strategy {
            BackoffStrategy::Exponential { base } if !base.is_finite() || *base < 1.0 => Err(
                TaskError::validation(format!("exponential base must be >= 1.0, got {}", base)),
            ),
            BackoffStrategy::Custom { delays_ms } if delays_ms.is_empty() => Err(
                TaskError::validation("custom backoff needs at least one delay"),
            ),
            _ => Ok(()),
        }
    }
}

impl RetryPolicy for BackoffPolicy {
    fn decide(&self, attempt: u32, error: &TaskError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Abort;
        }

        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }

        let after = error
            .retry_delay()
            .map(|delay| delay.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for_attempt(attempt));

        RetryDecision::Retry { after }
    }

    fn max_attempts(&self) -> Option<u32> {
        Some(self.max_attempts)
    }
}

/// Wrap `task` so failed attempts are retried according to `policy`.
///
/// A policy with a budget of zero attempts leaves the task undecorated.
pub fn retry<P>(task: &Task, policy: P) -> Task
where
    P: RetryPolicy,
{
    if policy.max_attempts() == Some(0) {
        return task.clone();
    }

    let policy = Arc::new(policy);
    task.decorate(move |inner, ctx| {
        let policy = policy.clone();
        async move { run_with_retry(&inner, policy.as_ref(), ctx).await }
    })
}

async fn run_with_retry<P>(task: &Task, policy: &P, ctx: Context) -> Result<()>
where
    P: RetryPolicy + ?Sized,
{
    let mut attempt = 1;

    loop {
        debug!("Executing {} attempt {}", task.name(), attempt);

        let error = match task.call(ctx.clone()).await {
            Ok(()) => {
                if attempt > 1 {
                    info!("{} succeeded after {} attempts", task.name(), attempt);
                }
                return Ok(());
            }
            Err(error) => error,
        };

        // A done context never starts another attempt.
        if let Some(reason) = ctx.err() {
            debug!("{} attempt {} ended after {}", task.name(), attempt, reason);
            return Err(TaskError::Cancelled(reason));
        }

        match policy.decide(attempt, &error) {
            RetryDecision::Retry { after } => {
                warn!(
                    "{} attempt {} failed: {}. Retrying in {:?}",
                    task.name(),
                    attempt,
                    error,
                    after
                );
                let Some(next) = next_attempt(attempt) else {
                    warn!("{} ran out of attempt numbers: {}", task.name(), error);
                    return Err(exhausted(attempt, error));
                };
                ctx.sleep(after).await?;
                attempt = next;
            }
            RetryDecision::Exhausted => {
                warn!("{} failed after {} attempts: {}", task.name(), attempt, error);
                return Err(exhausted(attempt, error));
            }
            RetryDecision::Abort => {
                debug!("{} failed with non-retryable error: {}", task.name(), error);
                return Err(error);
            }
        }
    }
}

/// Number of the attempt after `attempt`, or `None` once the counter is spent
fn next_attempt(attempt: u32) -> Option<u32> {
    attempt.checked_add(1)
}

fn exhausted(attempts: u32, error: TaskError) -> TaskError {
    TaskError::RetryExhausted {
        attempts,
        last_error: Box::new(error),
    }
}
