//! Task executor

use futures::stream::{FuturesUnordered, Stream};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info_span, warn, Instrument};

use bulwark_core::{Context, Result, Task, TaskError};

use crate::completion::Completion;
use crate::error::ExecutionError;

/// Executor configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Cap on launched tasks running at once; `None` is unbounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl ExecutorConfig {
    pub fn validate(&self) -> std::result::Result<(), ExecutionError> {
        if self.max_concurrency == Some(0) {
            return Err(ExecutionError::InvalidConfig(
                "max_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs tasks on a tokio runtime.
///
/// The executor never reinterprets task errors. The only error it adds is
/// [`TaskError::Aborted`], for a launched task that ended without reporting.
#[derive(Debug, Clone)]
pub struct Executor {
    handle: Handle,
    limit: Option<Arc<Semaphore>>,
}

impl Executor {
    /// Create an executor on the current runtime
    pub fn new(config: ExecutorConfig) -> std::result::Result<Self, ExecutionError> {
        let handle =
            Handle::try_current().map_err(|e| ExecutionError::NoRuntime(e.to_string()))?;
        Self::with_handle(handle, config)
    }

    /// Create an executor that spawns onto `handle`
    pub fn with_handle(
        handle: Handle,
        config: ExecutorConfig,
    ) -> std::result::Result<Self, ExecutionError> {
        config.validate()?;

        Ok(Self {
            handle,
            limit: config
                .max_concurrency
                .map(|permits| Arc::new(Semaphore::new(permits))),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Launched tasks that may start right now, if capped
    pub fn available_slots(&self) -> Option<usize> {
        self.limit.as_ref().map(|limit| limit.available_permits())
    }

    /// Run `task` and wait for its result
    pub async fn run(&self, task: &Task, ctx: Context) -> Result<()> {
        let result = task
            .call(ctx)
            .instrument(info_span!("task", name = %task.name()))
            .await;
        log_outcome(task.name(), &result);
        result
    }

    /// Run `task` to completion from synchronous code.
    ///
    /// Blocks the calling thread, which must not be a runtime worker.
    pub fn run_blocking(&self, task: &Task, ctx: Context) -> Result<()> {
        self.handle.block_on(self.run(task, ctx))
    }

    /// Start `task` in the background and return at once
    pub fn launch(&self, task: &Task, ctx: Context) -> Completion {
        let (sender, receiver) = oneshot::channel();
        let limit = self.limit.clone();
        let span = info_span!("task", name = %task.name());
        let task = task.clone();
        let name: Arc<str> = Arc::from(task.name());

        debug!(task = %name, "Launching task");

        let join = self.handle.spawn(
            async move {
                let result = match limit {
                    Some(limit) => run_with_permit(&task, &limit, ctx).await,
                    None => task.call(ctx).await,
                };
                log_outcome(task.name(), &result);

                // Nobody waiting is fine; the result is dropped.
                let _ = sender.send(result);
            }
            .instrument(span),
        );

        Completion::new(name, receiver, join.abort_handle())
    }

    /// Launch every task under its own child of `ctx`
    pub fn launch_all<I>(&self, tasks: I, ctx: &Context) -> Vec<Completion>
    where
        I: IntoIterator<Item = Task>,
    {
        tasks
            .into_iter()
            .map(|task| self.launch(&task, ctx.child()))
            .collect()
    }

    /// Wait for every completion; results come back in launch order
    pub async fn join_all(completions: Vec<Completion>) -> Vec<Result<()>> {
        futures::future::join_all(completions).await
    }

    /// Yield `(index, result)` pairs as tasks finish
    pub fn join_unordered(
        completions: Vec<Completion>,
    ) -> impl Stream<Item = (usize, Result<()>)> + Send + Unpin {
        completions
            .into_iter()
            .enumerate()
            .map(|(index, completion)| completion.map(move |result| (index, result)))
            .collect::<FuturesUnordered<_>>()
    }
}

async fn run_with_permit(task: &Task, limit: &Arc<Semaphore>, ctx: Context) -> Result<()> {
    let permit = ctx
        .run_until_done(limit.clone().acquire_owned())
        .await?
        .map_err(|_| TaskError::Aborted)?;

    let result = task.call(ctx).await;
    drop(permit);
    result
}

fn log_outcome(name: &str, result: &Result<()>) {
    match result {
        Ok(()) => debug!(task = %name, "Task completed"),
        Err(error) => warn!(task = %name, kind = error.kind(), error = %error, "Task failed"),
    }
}
