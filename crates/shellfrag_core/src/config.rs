//! Fragment cache configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use shellfrag_cache::ParsingMode;

use crate::CoreError;

/// Configuration file names, in lookup order.
pub const CONFIG_FILE_NAMES: &[&str] = &[".shellfrag.json"];

/// Configuration for fragment discovery and caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FragmentCacheConfig {
    /// Parsing mode used when both modes are not forced.
    #[serde(default = "default_mode")]
    pub default_mode: ParsingMode,

    /// Fragment patterns to include, relative to the fragment root.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Fragment patterns to exclude.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Whether to enable caching.
    #[serde(default = "default_cache")]
    pub cache: bool,

    /// Explicit store file. `$SHELLFRAG_CACHE_PATH` still wins over this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Load every persisted entry into memory when the service starts.
    #[serde(default)]
    pub prewarm: bool,

    /// Base directory for resolving relative paths.
    /// This is usually the directory containing the configuration file.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

fn default_mode() -> ParsingMode {
    ParsingMode::Ast
}

fn default_include() -> Vec<String> {
    vec!["**/*.ps1".to_string()]
}

fn default_cache() -> bool {
    true
}

impl FragmentCacheConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            default_mode: default_mode(),
            include: default_include(),
            exclude: Vec::new(),
            cache: true,
            store_path: None,
            prewarm: false,
            base_dir: None,
        }
    }

    /// Looks for a configuration file in `dir`.
    pub fn discover(dir: impl AsRef<Path>) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.as_ref().join(name))
            .find(|path| path.is_file())
    }

    /// Loads configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::config(format!("Failed to read config: {}", e)))?;

        let mut config = Self::from_json(&content)?;

        if let Some(parent) = path.parent() {
            config.base_dir = Some(parent.to_path_buf());
        }

        Ok(config)
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(|e| CoreError::config(format!("Invalid config: {}", e)))
    }

    /// Returns the configured store path, resolved against `base_dir`.
    pub fn store_path_override(&self) -> Option<PathBuf> {
        let path = self.store_path.as_ref()?;
        match &self.base_dir {
            Some(base) if path.is_relative() => Some(base.join(path)),
            _ => Some(path.clone()),
        }
    }
}

impl Default for FragmentCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn test_config_new() {
        let config = FragmentCacheConfig::new();
        assert_eq!(config.default_mode, ParsingMode::Ast);
        assert_eq!(config.include, vec!["**/*.ps1".to_string()]);
        assert!(config.cache);
        assert!(!config.prewarm);
    }

    #[test]
    fn test_config_from_empty_json() {
        let config = FragmentCacheConfig::from_json("{}").unwrap();
        assert_eq!(config.default_mode, ParsingMode::Ast);
        assert!(config.cache);
        assert!(config.store_path.is_none());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "default_mode": "regex",
            "include": ["profile.d/*.ps1"],
            "exclude": ["**/legacy/**"],
            "cache": false,
            "store_path": "cache/fragments.db",
            "prewarm": true
        }"#;

        let config = FragmentCacheConfig::from_json(json).unwrap();
        assert_eq!(config.default_mode, ParsingMode::Regex);
        assert_eq!(config.exclude.len(), 1);
        assert!(!config.cache);
        assert!(config.prewarm);
    }

    #[rstest]
    #[case::unknown_property(r#"{ "includes": [] }"#)]
    #[case::type_mismatch(r#"{ "cache": "yes" }"#)]
    #[case::invalid_mode(r#"{ "default_mode": "tokens" }"#)]
    #[case::not_json("default_mode = ast")]
    fn test_config_validation_errors(#[case] json: &str) {
        let err = FragmentCacheConfig::from_json(json).unwrap_err();
        assert!(
            err.to_string().contains("Invalid config"),
            "unexpected error: {}",
            err
        );
    }

    #[test]
    fn test_from_file_sets_base_dir_and_resolves_store_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".shellfrag.json");
        fs::write(&path, r#"{ "store_path": "state/cache.db" }"#).unwrap();

        let config = FragmentCacheConfig::from_file(&path).unwrap();
        assert_eq!(config.base_dir.as_deref(), Some(dir.path()));
        assert_eq!(
            config.store_path_override(),
            Some(dir.path().join("state/cache.db"))
        );
    }

    #[test]
    fn test_absolute_store_path_kept() {
        let mut config = FragmentCacheConfig::new();
        config.base_dir = Some(PathBuf::from("/somewhere"));
        config.store_path = Some(PathBuf::from("/abs/cache.db"));

        assert_eq!(
            config.store_path_override(),
            Some(PathBuf::from("/abs/cache.db"))
        );
    }

    #[test]
    fn test_discover() {
        let dir = tempdir().unwrap();
        assert!(FragmentCacheConfig::discover(dir.path()).is_none());

        fs::write(dir.path().join(".shellfrag.json"), "{}").unwrap();
        assert_eq!(
            FragmentCacheConfig::discover(dir.path()),
            Some(dir.path().join(".shellfrag.json"))
        );
    }

    #[test]
    fn test_from_file_missing() {
        let err = FragmentCacheConfig::from_file("/nonexistent/.shellfrag.json").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
