use anyhow::{anyhow, Result};
use bulwark_config::{ConfigLoader, LogLevel};
use bulwark_logging::{init_logging, init_simple_tracing};
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};
use commands::{handle_config_sample, handle_config_validate, handle_simulate, SimulateArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config { config_cmd } => {
            // Config commands must work on configuration that does not load
            init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;

            match config_cmd {
                ConfigCommands::Sample => handle_config_sample(),
                ConfigCommands::Validate => handle_config_validate(cli.config.as_deref()),
            }
        }
        Commands::Simulate {
            tasks,
            failure_rate,
            latency_ms,
            seed,
        } => {
            let mut config = ConfigLoader::new().load(cli.config.as_ref())?;
            if let Some(level) = &cli.log_level {
                config.logging.level = level.parse::<LogLevel>().map_err(|e| anyhow!(e))?;
            }
            init_logging(&config.logging)?;

            handle_simulate(
                &config,
                SimulateArgs {
                    tasks,
                    failure_rate,
                    latency_ms,
                    seed,
                },
            )
            .await
        }
    }
}
