//! Cache key model.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Nanoseconds per tick.
const NANOS_PER_TICK: u128 = 100;

/// Hosts whose default file systems ignore case in paths.
const CASE_INSENSITIVE_PATHS: bool = cfg!(any(windows, target_os = "macos"));

/// How the commands of a fragment were discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsingMode {
    /// Structural parsing of the fragment's syntax.
    Ast,
    /// Pattern matching against registration idioms in the raw text.
    Regex,
}

impl ParsingMode {
    /// Both modes, in merge order.
    pub const ALL: [ParsingMode; 2] = [ParsingMode::Ast, ParsingMode::Regex];

    /// Returns the value stored in the `parsing_mode` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParsingMode::Ast => "ast",
            ParsingMode::Regex => "regex",
        }
    }

    /// Returns the store table holding entries for this mode.
    pub fn table_name(&self) -> &'static str {
        match self {
            ParsingMode::Ast => "fragment_ast_cache",
            ParsingMode::Regex => "fragment_content_cache",
        }
    }
}

impl fmt::Display for ParsingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a cache entry.
///
/// Two keys are equal only when path, timestamp and mode all match, so a
/// fragment rewritten on disk can never hit the entry of its previous content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Absolute, case-normalized fragment path.
    pub file_path: String,

    /// Last-write time of the fragment in 100 ns ticks since 0001-01-01.
    pub last_write_ticks: i64,

    /// Mode that produced the command list.
    pub mode: ParsingMode,
}

impl CacheKey {
    /// Creates a key, normalizing the path.
    pub fn new(path: impl AsRef<Path>, last_write_ticks: i64, mode: ParsingMode) -> Self {
        Self {
            file_path: normalize_path(path.as_ref()),
            last_write_ticks,
            mode,
        }
    }

    /// Creates a key from an already normalized path string.
    pub fn from_normalized(file_path: String, last_write_ticks: i64, mode: ParsingMode) -> Self {
        Self {
            file_path,
            last_write_ticks,
            mode,
        }
    }

    /// Returns the same fragment/timestamp under another mode.
    pub fn with_mode(&self, mode: ParsingMode) -> Self {
        Self {
            file_path: self.file_path.clone(),
            last_write_ticks: self.last_write_ticks,
            mode,
        }
    }
}

/// Normalizes a fragment path for use in a cache key.
///
/// The path is made absolute (resolving symlinks when the file exists) and,
/// on Windows and macOS, lowercased. A case-sensitive volume mounted there
/// can then share keys between paths differing only in case.
pub fn normalize_path(path: &Path) -> String {
    let absolute: PathBuf = path
        .canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf());

    let text = absolute.to_string_lossy().into_owned();
    if CASE_INSENSITIVE_PATHS {
        text.to_lowercase()
    } else {
        text
    }
}

/// Converts a file-system timestamp to ticks.
pub fn system_time_to_ticks(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => UNIX_EPOCH_TICKS.saturating_add((after.as_nanos() / NANOS_PER_TICK) as i64),
        Err(before) => {
            UNIX_EPOCH_TICKS.saturating_sub((before.duration().as_nanos() / NANOS_PER_TICK) as i64)
        }
    }
}

/// Returns the current time in ticks.
pub fn ticks_now() -> i64 {
    system_time_to_ticks(SystemTime::now())
}
