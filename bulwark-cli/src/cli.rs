//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bulwark", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },

    /// Push simulated tasks through the configured policy stack
    Simulate {
        /// Number of tasks to fan out
        #[arg(long, value_name = "N", default_value_t = 100)]
        tasks: usize,

        /// Probability that a single attempt fails, between 0 and 1
        #[arg(long, value_name = "P", default_value_t = 0.2)]
        failure_rate: f64,

        /// Mean latency of a single attempt in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 50)]
        latency_ms: u64,

        /// Seed for a reproducible run
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print a sample configuration file
    Sample,

    /// Validate the file given with --config
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate() {
        let cli = Cli::try_parse_from([
            "bulwark",
            "simulate",
            "--tasks",
            "10",
            "--failure-rate",
            "0.5",
            "--seed",
            "7",
        ])
        .unwrap();

        match cli.command {
            Commands::Simulate {
                tasks,
                failure_rate,
                latency_ms,
                seed,
            } => {
                assert_eq!(tasks, 10);
                assert_eq!(failure_rate, 0.5);
                assert_eq!(latency_ms, 50);
                assert_eq!(seed, Some(7));
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli =
            Cli::try_parse_from(["bulwark", "config", "validate", "--config", "bulwark.yaml"])
                .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("bulwark.yaml")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                config_cmd: ConfigCommands::Validate
            }
        ));
    }
}
