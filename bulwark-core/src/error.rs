//! Task error types

use std::time::Duration;
use thiserror::Error;

use crate::context::CancelReason;

/// Error returned by a task or by one of the policies wrapping it
#[derive(Debug, Error)]
pub enum TaskError {
    /// Malformed policy configuration (zero timeout, zero rate, ...)
    #[error("Invalid policy configuration: {0}")]
    Validation(String),

    /// The context was cancelled or its deadline passed while waiting
    #[error("Task cancelled: {0}")]
    Cancelled(CancelReason),

    /// A timeout decorator gave up on the inner task
    #[error("Task timed out after {after:?}")]
    Timeout { after: Duration },

    /// No rate limit token became available within the allowed wait
    #[error("Rate limit exceeded, next token in {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    /// The circuit breaker rejected the call without running it
    #[error("Circuit breaker is open, retry in {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    /// The retry policy ran out of attempts
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last_error: Box<TaskError>,
    },

    /// Failure reported by the task itself
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// A launched task ended without reporting a result (panic or abort)
    #[error("Task ended without reporting a result")]
    Aborted,
}

/// Result type alias for task execution
pub type Result<T> = std::result::Result<T, TaskError>;

impl TaskError {
    /// Create a task failure from a message
    pub fn failed<M>(message: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        TaskError::Failed(anyhow::Error::msg(message))
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        TaskError::Validation(message.into())
    }

    /// Whether the error came from a cancelled or expired context
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled(_))
    }

    /// Whether a retry policy may try again after this error.
    ///
    /// Malformed configuration and a finished context are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TaskError::Validation(_) | TaskError::Cancelled(_))
    }

    /// Short label for logs and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::Validation(_) => "validation",
            TaskError::Cancelled(CancelReason::Cancelled) => "cancelled",
            TaskError::Cancelled(CancelReason::DeadlineExceeded) => "deadline_exceeded",
            TaskError::Timeout { .. } => "timeout",
            TaskError::RateLimitExceeded { .. } => "rate_limited",
            TaskError::CircuitOpen { .. } => "circuit_open",
            TaskError::RetryExhausted { .. } => "retry_exhausted",
            TaskError::Failed(_) => "failed",
            TaskError::Aborted => "aborted",
        }
    }

    /// The innermost error, looking through exhausted retries
    pub fn root_cause(&self) -> &TaskError {
        match self {
            TaskError::RetryExhausted { last_error, .. } => last_error.root_cause(),
            other => other,
        }
    }

    /// Consume the error and return the innermost one
    pub fn into_inner(self) -> TaskError {
        match self {
            TaskError::RetryExhausted { last_error, .. } => last_error.into_inner(),
            other => other,
        }
    }
}
