//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use shellfrag_core::ClearScope;

/// shellfrag - cached command discovery for shell-profile fragments
#[derive(Parser)]
#[command(name = "shellfrag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Cache store file (overrides $SHELLFRAG_CACHE_PATH and the config)
    #[arg(long, global = true, value_name = "FILE")]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clear the fragment cache
    Clear {
        /// Which parsing mode to clear
        #[arg(long, value_enum, default_value_t = Scope::All)]
        scope: Scope,

        /// Report what would be removed without removing it
        #[arg(long)]
        dry_run: bool,

        /// Delete the store file (only with --scope all)
        #[arg(long)]
        remove_file: bool,
    },

    /// Parse every fragment in both modes and cache the results
    Build {
        /// Fragment root directory
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Clear the cache before building
        #[arg(long)]
        force: bool,
    },

    /// Report the cache state
    Verify {
        /// Also report coverage of the fragments under this directory
        #[arg(long)]
        path: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Resolve the commands each fragment defines
    Resolve {
        /// Fragment root directory
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Use both parsing modes instead of the configured default
        #[arg(long)]
        both_modes: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scope {
    All,
    Ast,
    Regex,
}

impl From<Scope> for ClearScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::All => ClearScope::All,
            Scope::Ast => ClearScope::AstOnly,
            Scope::Regex => ClearScope::RegexOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
