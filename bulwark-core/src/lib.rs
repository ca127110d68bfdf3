//! Core task abstractions for Bulwark
//!
//! This crate defines the unit of work every other Bulwark crate builds on:
//! a cancellable, fallible [`Task`], the [`Context`] that carries
//! cancellation and deadlines into it, and the [`TaskError`] taxonomy that
//! policy decorators and the executor report through.

pub mod context;
pub mod error;
pub mod task;

// Re-export commonly used types at the crate root
pub use context::{CancelReason, Context};
pub use error::{Result, TaskError};
pub use task::{BoxTaskFuture, Task};
