//! Core error types.

use std::path::PathBuf;

use thiserror::Error;

use shellfrag_cache::ParsingMode;

/// Errors that can occur while resolving fragment commands.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The fragment root cannot be enumerated.
    #[error("Fragment discovery failed: {0}")]
    Discovery(String),

    /// A fragment could not be read.
    #[error("File error: {0}")]
    File(String),

    /// An extractor rejected a fragment.
    #[error("{mode} extraction failed for {}: {message}", .path.display())]
    Extraction {
        path: PathBuf,
        mode: ParsingMode,
        message: String,
    },
}

impl CoreError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a discovery error.
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery(message.into())
    }

    /// Creates a file error.
    pub fn file(message: impl Into<String>) -> Self {
        Self::File(message.into())
    }
}
