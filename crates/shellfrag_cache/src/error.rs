//! Cache error types.

use thiserror::Error;

/// Errors that can occur in the cache system.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The store location could not be determined.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The embedded store engine cannot be used on this host.
    #[error("Cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// Failed to read from the cache store.
    #[error("Failed to read cache: {0}")]
    ReadError(String),

    /// Failed to write to the cache store.
    #[error("Failed to write cache: {0}")]
    WriteError(String),

    /// Failed to create or migrate the cache tables.
    #[error("Schema error: {0}")]
    Schema(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a store-unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Creates a read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::ReadError(message.into())
    }

    /// Creates a write error.
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteError(message.into())
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Returns true if the store should be abandoned for the rest of the session.
    pub fn disables_store(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::StoreUnavailable(_) | Self::Schema(_)
        )
    }
}
