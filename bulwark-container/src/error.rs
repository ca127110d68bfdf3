//! Container error types

use thiserror::Error;

/// Registration and resolution errors
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("No entry registered for {0}")]
    NotFound(String),

    #[error("Name '{name}' is already registered for {existing}")]
    DuplicateName { name: String, existing: String },

    #[error("Invalid entry for {capability}: {reason}")]
    InvalidEntry { capability: String, reason: String },

    #[error("Entry '{name}' is registered as {registered}, not {requested}")]
    TypeMismatch {
        name: String,
        requested: String,
        registered: String,
    },

    #[error("Factory for {capability} failed: {source}")]
    FactoryFailed {
        capability: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for container operations
pub type Result<T> = std::result::Result<T, ContainerError>;
