//! Timeout decorator

use log::{debug, warn};
use std::time::Duration;

use bulwark_core::{CancelReason, Context, Result, Task, TaskError};

/// Wrap `task` so each call fails with [`TaskError::Timeout`] once `after`
/// has elapsed.
///
/// The inner task runs under a child context whose deadline is `now + after`
/// (or the caller's deadline, if that is earlier). When our deadline fires
/// first the child context is cancelled and the inner future dropped.
pub fn timeout(task: &Task, after: Duration) -> Result<Task> {
    if after.is_zero() {
        return Err(TaskError::validation("timeout must be greater than zero"));
    }

    Ok(wrap_timeout(task, after))
}

/// [`timeout`] for a duration already known to be non-zero
pub(crate) fn wrap_timeout(task: &Task, after: Duration) -> Task {
    task.decorate(move |inner, ctx| async move { run_with_timeout(&inner, after, ctx).await })
}

async fn run_with_timeout(task: &Task, after: Duration, ctx: Context) -> Result<()> {
    ctx.check()?;

    let deadline = tokio::time::Instant::now() + after;
    let child = ctx.with_deadline(deadline);

    let result = tokio::select! {
        biased;
        reason = ctx.done() => {
            child.cancel();
            debug!("{} interrupted by caller: {}", task.name(), reason);
            return Err(TaskError::Cancelled(reason));
        }
        _ = tokio::time::sleep_until(deadline) => {
            child.cancel();
            warn!("{} timed out after {:?}", task.name(), after);
            return Err(TaskError::Timeout { after });
        }
        result = task.call(child.clone()) => result,
    };

    match result {
        // The inner task noticed our deadline before the select did.
        Err(TaskError::Cancelled(CancelReason::DeadlineExceeded))
            if !ctx.is_done() && tokio::time::Instant::now() >= deadline =>
        {
            warn!("{} timed out after {:?}", task.name(), after);
            Err(TaskError::Timeout { after })
        }
        other => other,
    }
}
