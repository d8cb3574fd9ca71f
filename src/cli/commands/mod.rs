//! Command implementations

pub mod account;
pub mod obtain;
pub mod revoke;

use crate::cli::args::{Cli, Commands};
use crate::config::EngineConfig;
use crate::error::Result;
use std::path::Path;

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let config = base_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Obtain(args) => obtain::run(config, args).await,
        Commands::Revoke(args) => revoke::run(config, args).await,
        Commands::Account(args) => account::run(config, args).await,
    }
}

fn base_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Apply the shared directory flags to a config
pub(crate) fn apply_directory(
    mut config: EngineConfig,
    directory: Option<&str>,
    staging: bool,
) -> EngineConfig {
    if let Some(url) = directory {
        config.directory_url = url.to_string();
    } else if staging {
        config.directory_url = crate::config::LETS_ENCRYPT_STAGING.to_string();
    }
    config
}
