//! shellfrag CLI
//!
//! Maintains the fragment parsing cache: clear, build, verify and resolve.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use miette::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{:?}", e);
            ExitCode::from(2)
        }
    }
}

/// Runs a command. `Ok(true)` means it completed with errors.
fn run(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Commands::Clear {
            scope,
            dry_run,
            remove_file,
        } => commands::clear::run_clear(cli, (*scope).into(), *dry_run, *remove_file),
        Commands::Build { path, force } => commands::build::run_build(cli, path, *force),
        Commands::Verify { path, format } => {
            commands::verify::run_verify(cli, path.as_deref(), *format)
        }
        Commands::Resolve {
            path,
            both_modes,
            format,
        } => commands::resolve::run_resolve(cli, path, *both_modes, *format),
    }
}
