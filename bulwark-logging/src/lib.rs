//! Logging initialisation for Bulwark
//!
//! Installs a `tracing` subscriber configured from
//! [`bulwark_config::LoggingConfig`]. Crates that log through the `log`
//! facade end up in the same output.

pub mod init;

pub use init::{init_logging, init_simple_tracing};
