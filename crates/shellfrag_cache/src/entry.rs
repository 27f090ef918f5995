//! Cache entry types.

use serde::{Deserialize, Serialize};

use crate::CacheError;
use crate::key::{CacheKey, ParsingMode, ticks_now};

/// Commands discovered in one fragment under one parsing mode.
///
/// Entries are immutable: a changed fragment produces a new entry under a
/// new key rather than an update of `command_names`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    key: CacheKey,

    command_names: Vec<String>,

    /// Timestamp (ticks) when this entry was created.
    created_at_ticks: i64,
}

impl CacheEntry {
    /// Creates a new cache entry stamped with the current time.
    pub fn new(key: CacheKey, command_names: Vec<String>) -> Self {
        Self::with_created_at(key, command_names, ticks_now())
    }

    /// Creates an entry with an explicit creation timestamp.
    pub fn with_created_at(key: CacheKey, command_names: Vec<String>, created_at_ticks: i64) -> Self {
        Self {
            key,
            command_names,
            created_at_ticks,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn mode(&self) -> ParsingMode {
        self.key.mode
    }

    pub fn command_names(&self) -> &[String] {
        &self.command_names
    }

    pub fn created_at_ticks(&self) -> i64 {
        self.created_at_ticks
    }

    /// Checks if this entry still describes the fragment as it is on disk.
    ///
    /// Only an exact tick match counts; any difference invalidates.
    pub fn is_valid_for(&self, current_write_ticks: i64) -> bool {
        self.key.last_write_ticks == current_write_ticks
    }

    /// Serializes the command list for the `commands` column.
    pub fn encode_commands(&self) -> Result<String, CacheError> {
        serde_json::to_string(&self.command_names)
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Parses a `commands` column value.
    pub fn decode_commands(raw: &str) -> Result<Vec<String>, CacheError> {
        serde_json::from_str(raw).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}
