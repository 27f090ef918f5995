use crate::config::FragmentCacheConfig;
use crate::error::CoreError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use shellfrag_cache::{CacheKey, ParsingMode, normalize_path, system_time_to_ticks};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// A fragment file as seen by discovery.
///
/// This is the probe used to build cache keys; it is never cached itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDescriptor {
    /// Path of the fragment as discovered.
    pub path: PathBuf,
    /// Last-write time in ticks at discovery.
    pub last_write_ticks: i64,
    key_path: String,
}

impl FragmentDescriptor {
    /// Describes a file from its current metadata.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let last_write_ticks = last_write_ticks(path)?;
        Ok(Self::new(path, last_write_ticks))
    }

    /// Describes a file with a known timestamp.
    pub fn new(path: impl AsRef<Path>, last_write_ticks: i64) -> Self {
        let path = path.as_ref();
        Self {
            path: path.to_path_buf(),
            last_write_ticks,
            key_path: normalize_path(path),
        }
    }

    /// Normalized path used in cache keys.
    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// Builds the lookup key for a mode at the discovery timestamp.
    pub fn key(&self, mode: ParsingMode) -> CacheKey {
        self.key_at(self.last_write_ticks, mode)
    }

    /// Builds a key for a mode at another observed timestamp.
    pub fn key_at(&self, last_write_ticks: i64, mode: ParsingMode) -> CacheKey {
        CacheKey::from_normalized(self.key_path.clone(), last_write_ticks, mode)
    }
}

/// Reads a file's last-write time in ticks.
pub fn last_write_ticks(path: &Path) -> Result<i64, CoreError> {
    let metadata = fs::metadata(path).map_err(|e| {
        CoreError::file(format!(
            "Failed to read metadata for {}: {}",
            path.display(),
            e
        ))
    })?;

    if !metadata.is_file() {
        return Err(CoreError::file(format!(
            "Not a regular file: {}",
            path.display()
        )));
    }

    let modified = metadata.modified().map_err(|e| {
        CoreError::file(format!(
            "No modification time for {}: {}",
            path.display(),
            e
        ))
    })?;

    Ok(system_time_to_ticks(modified))
}

pub struct FragmentFinder {
    include_globs: Option<GlobSet>,
    exclude_globs: Option<GlobSet>,
}

impl FragmentFinder {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, CoreError> {
        let include_globs = Self::build_globset(include)?;
        let exclude_globs = Self::build_globset(exclude)?;

        Ok(Self {
            include_globs,
            exclude_globs,
        })
    }

    pub fn from_config(config: &FragmentCacheConfig) -> Result<Self, CoreError> {
        Self::new(&config.include, &config.exclude)
    }

    fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, CoreError> {
        if patterns.is_empty() {
            return Ok(None);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| CoreError::config(format!("Invalid glob pattern: {}", e)))?;
            builder.add(glob);
        }

        let globset = builder
            .build()
            .map_err(|e| CoreError::config(format!("Failed to build globset: {}", e)))?;

        Ok(Some(globset))
    }

    /// Checks if a path (relative to the fragment root) should be ignored.
    pub fn should_ignore(&self, relative: &Path) -> bool {
        if self
            .exclude_globs
            .as_ref()
            .is_some_and(|excludes| excludes.is_match(relative))
        {
            return true;
        }

        if self
            .include_globs
            .as_ref()
            .is_some_and(|includes| !includes.is_match(relative))
        {
            return true;
        }

        false
    }

    /// Enumerates the fragments under `root`, sorted by path.
    ///
    /// A missing root is a setup error; individual unreadable entries are
    /// skipped.
    pub fn discover(&self, root: &Path) -> Result<Vec<FragmentDescriptor>, CoreError> {
        if !root.is_dir() {
            return Err(CoreError::discovery(format!(
                "fragment root does not exist or is not a directory: {}",
                root.display()
            )));
        }

        let mut fragments = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.should_ignore(relative) {
                continue;
            }

            match FragmentDescriptor::from_path(path) {
                Ok(fragment) => fragments.push(fragment),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        // A symlink and its target share a key; the first path in order wins.
        fragments.sort_by(|a, b| a.path.cmp(&b.path));
        let mut seen = HashSet::new();
        fragments.retain(|fragment| seen.insert(fragment.key_path.clone()));

        info!(
            "Discovered {} fragments under {}",
            fragments.len(),
            root.display()
        );
        Ok(fragments)
    }
}
