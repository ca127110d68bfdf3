//! CLI command implementations

pub mod config;
pub mod simulate;

pub use config::*;
pub use simulate::*;
