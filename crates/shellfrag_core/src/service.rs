//! The cache orchestrator.
//!
//! `CacheService` owns the memory tier, the store handle and the extractors
//! for one process. Store failures never reach the caller: they are matched
//! against [`StoreFailure`] to decide between degrading to memory-only
//! operation, treating a read as a miss and dropping a write.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use shellfrag_cache::{
    CacheEntry, CacheError, CacheKey, FragmentStore, MemoryTier, ParsingMode, resolve_store_path,
};

use crate::config::FragmentCacheConfig;
use crate::error::CoreError;
use crate::extractor::{Extractors, push_unique};
use crate::file_finder::{FragmentDescriptor, last_write_ticks};
use crate::stats::{HitTier, ParseStatistics};

/// The optional collaborators resolved once when the service is built.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Capabilities {
    /// Where the store lives, if a location could be resolved.
    pub store_path: Option<PathBuf>,
    /// Whether the SQLite engine works on this host.
    pub engine_available: bool,
    /// Whether entries are persisted across processes.
    pub persistence: bool,
    /// Why persistence is off, when it is.
    pub degraded_reason: Option<String>,
}

/// Commands resolved for one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentCommands {
    pub path: PathBuf,
    /// Merged command names across the requested modes.
    pub commands: Vec<String>,
    /// Whether the fragment could not be read or an extractor rejected it.
    pub failed: bool,
}

/// Result of one `resolve_commands` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveOutcome {
    pub files: Vec<FragmentCommands>,
    pub stats: ParseStatistics,
}

impl ResolveOutcome {
    /// Looks up the result for a path.
    pub fn get(&self, path: &Path) -> Option<&FragmentCommands> {
        self.files.iter().find(|file| file.path == path)
    }
}

/// How a store error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreFailure {
    /// Persistence is unusable for the rest of the session.
    Disable,
    /// The lookup counts as a miss.
    Miss,
    /// The write is logged and dropped.
    DropWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreOp {
    Read,
    Write,
}

impl StoreFailure {
    fn classify(error: &CacheError, op: StoreOp) -> Self {
        if error.disables_store() {
            return Self::Disable;
        }
        match op {
            StoreOp::Read => Self::Miss,
            StoreOp::Write => Self::DropWrite,
        }
    }
}

/// Builds a [`CacheService`].
pub struct CacheServiceBuilder {
    config: FragmentCacheConfig,
    extractors: Option<Extractors>,
    store_path: Option<PathBuf>,
    memory_only: bool,
    read_only: bool,
    defer_creation: bool,
}

impl CacheServiceBuilder {
    /// Replaces the built-in extractors.
    pub fn extractors(mut self, extractors: Extractors) -> Self {
        self.extractors = Some(extractors);
        self
    }

    /// Uses this store file instead of resolving one.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Never opens a store.
    pub fn memory_only(mut self) -> Self {
        self.memory_only = true;
        self
    }

    /// Never creates or writes the store.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Leaves a missing store file uncreated until the first write.
    pub fn defer_store_creation(mut self) -> Self {
        self.defer_creation = true;
        self
    }

    /// Builds the service.
    ///
    /// Never fails: when the store cannot be used the service runs
    /// memory-only and records why in its [`Capabilities`].
    pub fn build(self) -> CacheService {
        let mut service = CacheService {
            extractors: self.extractors.unwrap_or_default(),
            memory: MemoryTier::new(),
            store: None,
            capabilities: Capabilities::default(),
            read_only: self.read_only,
            schema_ready: false,
            persistence_requested: false,
            config: self.config,
        };

        if !service.config.cache {
            service.memory.disable();
            service.capabilities.degraded_reason = Some("caching is disabled".to_string());
            info!("Fragment cache disabled by configuration");
            return service;
        }

        if self.memory_only {
            service.capabilities.degraded_reason = Some("persistence not requested".to_string());
            return service;
        }

        service.persistence_requested = true;
        let path = match self.store_path {
            Some(path) => Ok(path),
            None => resolve_store_path(service.config.store_path_override().as_deref()),
        };
        service.attach_store(path, self.defer_creation);

        if service.config.prewarm && service.store.is_some() {
            service.prewarm();
        }

        service
    }
}

/// Resolves fragment commands through the memory tier, the store and the extractors.
pub struct CacheService {
    pub(crate) config: FragmentCacheConfig,
    extractors: Extractors,
    pub(crate) memory: MemoryTier,
    pub(crate) store: Option<FragmentStore>,
    capabilities: Capabilities,
    read_only: bool,
    /// Whether the store tables are known to exist.
    pub(crate) schema_ready: bool,
    /// Whether a store was wanted, so its absence is a failure.
    pub(crate) persistence_requested: bool,
}

impl CacheService {
    /// Starts building a service for `config`.
    pub fn builder(config: FragmentCacheConfig) -> CacheServiceBuilder {
        CacheServiceBuilder {
            config,
            extractors: None,
            store_path: None,
            memory_only: false,
            read_only: false,
            defer_creation: false,
        }
    }

    /// Builds a service with the built-in extractors and the resolved store.
    pub fn new(config: FragmentCacheConfig) -> Self {
        Self::builder(config).build()
    }

    fn attach_store(&mut self, path: Result<PathBuf, CacheError>, defer_creation: bool) {
        self.capabilities.engine_available = FragmentStore::is_available();

        let path = match path {
            Ok(path) => path,
            Err(e) => {
                self.degrade(&e);
                return;
            }
        };
        self.capabilities.store_path = Some(path.clone());

        if !self.capabilities.engine_available {
            self.degrade(&CacheError::unavailable("the SQLite engine is not usable"));
            return;
        }

        let mut store = FragmentStore::new(path);
        if !self.read_only && !(defer_creation && !store.exists()) {
            if let Err(e) = store.ensure_schema() {
                self.degrade(&e);
                return;
            }
            self.schema_ready = true;
        }

        debug!("Using fragment cache store {}", store.path().display());
        self.store = Some(store);
        self.capabilities.persistence = true;
    }

    /// Switches to memory-only operation for the rest of the session.
    fn degrade(&mut self, error: &CacheError) {
        warn!("Fragment cache store unavailable, continuing in memory: {}", error);
        if let Some(mut store) = self.store.take() {
            store.close();
        }
        self.schema_ready = false;
        self.capabilities.persistence = false;
        self.capabilities.degraded_reason = Some(error.to_string());
    }

    fn handle_store_error(&mut self, op: StoreOp, key: &CacheKey, error: CacheError) {
        match StoreFailure::classify(&error, op) {
            StoreFailure::Disable => self.degrade(&error),
            StoreFailure::Miss => warn!(
                "Cache read failed for {} ({}): {}",
                key.file_path, key.mode, error
            ),
            StoreFailure::DropWrite => warn!(
                "Cache write dropped for {} ({}): {}",
                key.file_path, key.mode, error
            ),
        }
    }

    pub fn config(&self) -> &FragmentCacheConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    /// The store handle, unless running memory-only.
    pub fn store(&mut self) -> Option<&mut FragmentStore> {
        self.store.as_mut()
    }

    pub fn is_memory_only(&self) -> bool {
        self.store.is_none()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Modes resolved per fragment.
    pub fn modes(&self, force_both_modes: bool) -> Vec<ParsingMode> {
        if force_both_modes {
            ParsingMode::ALL.to_vec()
        } else {
            vec![self.config.default_mode]
        }
    }

    /// Loads the persisted entries that still match their fragment on disk
    /// into memory. Returns how many were loaded.
    pub fn prewarm(&mut self) -> usize {
        if !self.memory.is_enabled() {
            return 0;
        }

        let mut loaded = 0;
        for mode in ParsingMode::ALL {
            let Some(store) = self.store.as_mut() else {
                break;
            };
            match store.load_all(mode) {
                Ok(entries) => {
                    for entry in entries {
                        let current = last_write_ticks(Path::new(&entry.key().file_path));
                        if current.is_ok_and(|ticks| entry.is_valid_for(ticks)) {
                            self.memory.set(entry);
                            loaded += 1;
                        }
                    }
                }
                Err(e) if e.disables_store() => self.degrade(&e),
                Err(e) => warn!("Failed to pre-warm {} entries: {}", mode, e),
            }
        }

        info!("Pre-warmed {} fragment cache entries", loaded);
        loaded
    }

    /// Looks a key up in the store, if there is one to look in.
    pub(crate) fn store_lookup(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let store = self.store.as_mut()?;
        if !store.exists() {
            return None;
        }

        match store.try_get(key) {
            Ok(entry) => entry,
            Err(e) => {
                self.handle_store_error(StoreOp::Read, key, e);
                None
            }
        }
    }

    fn store_write(&mut self, entry: &CacheEntry) {
        if self.read_only {
            return;
        }
        let Some(store) = self.store.as_mut() else {
            return;
        };

        // Another process may have removed the file under an open connection.
        if self.schema_ready && !store.exists() {
            debug!("Store file {} is gone; reopening", store.path().display());
            store.close();
            self.schema_ready = false;
        }

        if !self.schema_ready {
            match store.ensure_schema() {
                Ok(()) => self.schema_ready = true,
                Err(e) => {
                    self.degrade(&e);
                    return;
                }
            }
        }

        if let Err(e) = store.try_put(entry) {
            self.handle_store_error(StoreOp::Write, entry.key(), e);
        }
    }

    /// Resolves the commands of each fragment.
    ///
    /// Each fragment is resolved in both modes when `force_both_modes` is set,
    /// otherwise in the configured default mode. Fragments that cannot be
    /// read or parsed are reported as failed with no commands; the batch
    /// always completes.
    pub fn resolve_commands(
        &mut self,
        fragments: &[FragmentDescriptor],
        force_both_modes: bool,
    ) -> ResolveOutcome {
        let modes = self.modes(force_both_modes);
        let mut stats = ParseStatistics {
            fragments_discovered: fragments.len(),
            ..Default::default()
        };

        let files = fragments
            .iter()
            .map(|fragment| self.resolve_fragment(fragment, &modes, &mut stats))
            .collect();

        info!(
            "Resolved {} fragments: {} parsed, {} failed, {} hits, {} misses",
            stats.fragments_discovered,
            stats.fragments_parsed,
            stats.fragments_failed,
            stats.cache_hits(),
            stats.cache_misses
        );

        ResolveOutcome { files, stats }
    }

    fn resolve_fragment(
        &mut self,
        fragment: &FragmentDescriptor,
        modes: &[ParsingMode],
        stats: &mut ParseStatistics,
    ) -> FragmentCommands {
        let mut failed = false;
        let mut per_mode = Vec::with_capacity(modes.len());

        match last_write_ticks(&fragment.path) {
            Ok(current_ticks) => {
                let mut source: Option<Result<FragmentSource, CoreError>> = None;

                for &mode in modes {
                    let key = fragment.key_at(current_ticks, mode);
                    let commands = match self.lookup(&key, stats) {
                        Some(commands) => commands,
                        None => {
                            let source = source
                                .get_or_insert_with(|| FragmentSource::read(&fragment.path));
                            match source {
                                Ok(source) => {
                                    match self.extract(fragment, source, mode, stats) {
                                        Ok(commands) => commands,
                                        Err(e) => {
                                            warn!("{}", e);
                                            failed = true;
                                            Vec::new()
                                        }
                                    }
                                }
                                Err(e) => {
                                    if !failed {
                                        warn!("Skipping fragment: {}", e);
                                    }
                                    failed = true;
                                    Vec::new()
                                }
                            }
                        }
                    };
                    stats.commands_discovered += commands.len();
                    per_mode.push(commands);
                }
            }
            Err(e) => {
                warn!("Skipping fragment: {}", e);
                failed = true;
            }
        }

        if failed {
            stats.fragments_failed += 1;
        } else {
            stats.fragments_parsed += 1;
        }

        let commands = merge_commands(&per_mode);
        stats.commands_registered += commands.len();

        FragmentCommands {
            path: fragment.path.clone(),
            commands,
            failed,
        }
    }

    /// Checks the memory tier, then the store.
    fn lookup(&mut self, key: &CacheKey, stats: &mut ParseStatistics) -> Option<Vec<String>> {
        if let Some(entry) = self.memory.get(key) {
            debug!("Memory hit for {} ({})", key.file_path, key.mode);
            stats.record_hit(key.mode, HitTier::Memory);
            return Some(entry.command_names().to_vec());
        }

        if let Some(entry) = self.store_lookup(key) {
            debug!("Store hit for {} ({})", key.file_path, key.mode);
            stats.record_hit(key.mode, HitTier::Store);
            let commands = entry.command_names().to_vec();
            self.memory.set(entry);
            return Some(commands);
        }

        debug!("Cache miss for {} ({})", key.file_path, key.mode);
        stats.cache_misses += 1;
        None
    }

    /// Runs the mode's extractor and caches the result when the read was stable.
    fn extract(
        &mut self,
        fragment: &FragmentDescriptor,
        source: &FragmentSource,
        mode: ParsingMode,
        stats: &mut ParseStatistics,
    ) -> Result<Vec<String>, CoreError> {
        stats.extractor_invocations += 1;
        let commands = self
            .extractors
            .get(mode)
            .extract(&source.content)
            .map_err(|e| CoreError::Extraction {
                path: fragment.path.clone(),
                mode,
                message: e.to_string(),
            })?;

        if source.stable {
            let entry = CacheEntry::new(fragment.key_at(source.ticks, mode), commands.clone());
            self.store_write(&entry);
            self.memory.set(entry);
        } else {
            debug!(
                "{} changed while being read; not caching",
                fragment.path.display()
            );
        }

        Ok(commands)
    }
}

/// Fragment content read once and shared by both modes.
struct FragmentSource {
    content: String,
    /// Last-write time observed when the content was read.
    ticks: i64,
    /// Whether the file was left untouched during the read.
    stable: bool,
}

impl FragmentSource {
    fn read(path: &Path) -> Result<Self, CoreError> {
        let before = last_write_ticks(path)?;
        let bytes = fs::read(path)
            .map_err(|e| CoreError::file(format!("Failed to read {}: {}", path.display(), e)))?;
        let after = last_write_ticks(path)?;

        let content = String::from_utf8_lossy(&bytes);
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content).to_string();

        Ok(Self {
            content,
            ticks: before,
            stable: before == after,
        })
    }
}

/// Merges per-mode command lists.
///
/// Names keep the position of their first occurrence, so the first list
/// (AST mode when both modes are resolved) wins on overlap. Names are
/// compared ignoring ASCII case.
pub fn merge_commands(lists: &[Vec<String>]) -> Vec<String> {
    let mut merged = Vec::new();
    for name in lists.iter().flatten() {
        push_unique(&mut merged, name);
    }
    merged
}
