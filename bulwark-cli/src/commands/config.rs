//! `bulwark config` subcommands

use anyhow::{Context, Result};
use bulwark_config::{BulwarkConfig, ConfigLoader};
use std::path::Path;
use tracing::{error, info};

/// Print the sample configuration to stdout
pub fn handle_config_sample() -> Result<()> {
    print!("{}", BulwarkConfig::generate_sample());
    Ok(())
}

/// Load and validate a configuration file
pub fn handle_config_validate(config_file: Option<&Path>) -> Result<()> {
    let config_file = config_file.context("--config PATH is required for validation")?;
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(_config) => {
            println!("Configuration file is valid");
            info!("Configuration validation passed");
            Ok(())
        }
        Err(e) => {
            println!("Configuration validation failed: {}", e);
            error!("Configuration validation failed: {}", e);
            Err(e.into())
        }
    }
}
