pub mod build;
pub mod clear;
pub mod resolve;
pub mod verify;

use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tracing::info;

use shellfrag_core::{CacheService, CacheServiceBuilder, FragmentCacheConfig};

use crate::cli::Cli;

/// Loads the configuration named on the command line, or the one in the current directory.
pub fn load_config(cli: &Cli) -> Result<FragmentCacheConfig> {
    match &cli.config {
        Some(path) => FragmentCacheConfig::from_file(path).into_diagnostic(),
        None => find_config(),
    }
}

pub fn find_config() -> Result<FragmentCacheConfig> {
    if let Some(path) = FragmentCacheConfig::discover(".") {
        info!("Using config: {}", path.display());
        return FragmentCacheConfig::from_file(&path).into_diagnostic();
    }

    info!("No config file found, using defaults");
    Ok(FragmentCacheConfig::new())
}

/// Starts a service builder honoring `--store`.
pub fn service_builder(cli: &Cli, config: FragmentCacheConfig) -> CacheServiceBuilder {
    let builder = CacheService::builder(config);
    match &cli.store {
        Some(path) => builder.store_path(path),
        None => builder,
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).into_diagnostic()?
    );
    Ok(())
}
