//! Cancellation and deadline propagation
//!
//! A [`Context`] pairs a [`CancellationToken`] with an optional deadline.
//! Children inherit both: cancelling a parent cancels every child, and a
//! child's deadline is never later than its parent's.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskError};

/// Why a context finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Cancelled by the caller or a parent context
    Cancelled,
    /// The deadline passed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "context cancelled"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Cancellation and deadline signals handed to every task invocation
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A root context that is never cancelled on its own
    pub fn background() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// Wrap an existing cancellation token
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a child that can be cancelled independently of this context
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child that expires at `deadline` (or earlier, if this context does)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing <= deadline => existing,
            _ => deadline,
        };

        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derive a child that expires `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Fail with [`TaskError::Cancelled`] if the context is already done
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(reason) => Err(TaskError::Cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Resolve once the context is cancelled or its deadline passes
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => CancelReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }

    /// Sleep for `duration`, returning early with an error if the context ends first
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;
        if duration.is_zero() {
            return Ok(());
        }

        tokio::select! {
            biased;
            reason = self.done() => Err(TaskError::Cancelled(reason)),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Drive `future` to completion unless the context ends first
    pub async fn run_until_done<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future,
    {
        self.check()?;

        tokio::select! {
            biased;
            reason = self.done() => Err(TaskError::Cancelled(reason)),
            output = future => Ok(output),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
