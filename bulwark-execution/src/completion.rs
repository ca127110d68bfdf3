//! Completion handle for launched tasks

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as PollContext, Poll};

use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use bulwark_core::{Context, Result, TaskError};

/// Receives the single result of a launched task.
///
/// Await it (or call [`Completion::wait`]) to get the result. If the task
/// panicked or was aborted before reporting, the result is
/// [`TaskError::Aborted`]. Dropping a completion does not stop the task.
#[derive(Debug)]
pub struct Completion {
    name: Arc<str>,
    receiver: oneshot::Receiver<Result<()>>,
    abort: AbortHandle,
}

impl Completion {
    pub(crate) fn new(
        name: Arc<str>,
        receiver: oneshot::Receiver<Result<()>>,
        abort: AbortHandle,
    ) -> Self {
        Self {
            name,
            receiver,
            abort,
        }
    }

    /// Name of the launched task
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task at its next suspension point
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    /// The result, if it has arrived. Returns `Some` at most once with the
    /// task's own result.
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TaskError::Aborted)),
        }
    }

    /// Wait for the result unless `ctx` ends first.
    ///
    /// Giving up the wait leaves the task running.
    pub async fn wait(self, ctx: &Context) -> Result<()> {
        ctx.run_until_done(self).await?
    }
}

impl Future for Completion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Aborted)))
    }
}
