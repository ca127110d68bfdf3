//! Error types for executor construction

use thiserror::Error;

/// Executor setup errors.
///
/// Task failures are never wrapped here; they come back as
/// [`bulwark_core::TaskError`] unchanged.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Invalid executor configuration: {0}")]
    InvalidConfig(String),
}
