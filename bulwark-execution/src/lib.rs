//! Bulwark Execution Engine
//!
//! Runs tasks, decorated or not, on a tokio runtime: awaiting them in place
//! ([`Executor::run`]), launching them in the background behind a
//! [`Completion`] handle ([`Executor::launch`]), and fanning many out and
//! joining the results.

pub mod completion;
pub mod error;
pub mod executor;

// Re-export main types
pub use completion::Completion;
pub use error::ExecutionError;
pub use executor::{Executor, ExecutorConfig};
