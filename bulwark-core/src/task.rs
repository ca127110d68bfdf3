//! The task abstraction
//!
//! A [`Task`] wraps a closure `Fn(Context) -> Future<Output = Result<()>>` and
//! produces a fresh future on every call. Cloning a task is cheap and shares
//! the closure. Decorators never mutate a task; [`Task::decorate`] builds a
//! new one around it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;

/// Boxed future returned by a task invocation
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

type TaskFn = dyn Fn(Context) -> BoxTaskFuture + Send + Sync;

/// A cancellable, fallible unit of work
#[derive(Clone)]
pub struct Task {
    name: Arc<str>,
    f: Arc<TaskFn>,
}

impl Task {
    /// Create an unnamed task
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::named("task", f)
    }

    /// Create a task with a name used in logs and spans
    pub fn named<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |ctx: Context| -> BoxTaskFuture { Box::pin(f(ctx)) }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the same task under a different name
    pub fn rename(self, name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            f: self.f,
        }
    }

    /// Invoke the task once
    pub fn call(&self, ctx: Context) -> BoxTaskFuture {
        (self.f)(ctx)
    }

    /// Build a new task that receives this one as its inner task.
    ///
    /// The wrapper keeps this task's name. It is called with a clone of the
    /// inner task and the context for every invocation.
    pub fn decorate<F, Fut>(&self, wrapper: F) -> Task
    where
        F: Fn(Task, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let inner = self.clone();
        Task {
            name: self.name.clone(),
            f: Arc::new(move |ctx: Context| -> BoxTaskFuture {
                Box::pin(wrapper(inner.clone(), ctx))
            }),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}
