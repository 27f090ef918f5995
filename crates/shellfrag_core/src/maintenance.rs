//! Maintenance operations: clear, build and verify.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use shellfrag_cache::{ClearScope, ParsingMode};

use crate::error::CoreError;
use crate::file_finder::FragmentFinder;
use crate::service::CacheService;
use crate::stats::ParseStatistics;

/// Options for [`CacheService::clear`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearOptions {
    /// Delete the store file instead of emptying its tables (`ClearScope::All` only).
    pub remove_store_file: bool,
    /// Report what would be removed without removing it.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Skipped,
    Failed,
}

/// The result of one sub-operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub name: &'static str,
    pub status: StepStatus,
    /// Entries removed, or that would be removed on a dry run.
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepOutcome {
    fn succeeded(name: &'static str, removed: usize) -> Self {
        Self {
            name,
            status: StepStatus::Succeeded,
            removed,
            detail: None,
        }
    }

    fn skipped(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Skipped,
            removed: 0,
            detail: Some(reason.into()),
        }
    }

    fn failed(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            status: StepStatus::Failed,
            removed: 0,
            detail: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// What a clear did, per tier.
#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub scope: ClearScope,
    pub dry_run: bool,
    pub memory: StepOutcome,
    pub store: StepOutcome,
    pub bytes_removed: u64,
    pub file_removed: bool,
}

impl ClearReport {
    /// True when no sub-operation failed.
    pub fn is_complete(&self) -> bool {
        !self.memory.is_failed() && !self.store.is_failed()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub root: PathBuf,
    pub stats: ParseStatistics,
    /// The clear run first when the build was forced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared: Option<ClearReport>,
    /// Superseded rows deleted after the build.
    pub stale_purged: usize,
    pub persisted: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl BuildReport {
    /// True when a fragment failed or the forced clear was incomplete.
    pub fn has_errors(&self) -> bool {
        self.stats.fragments_failed > 0
            || self
                .cleared
                .as_ref()
                .is_some_and(|cleared| !cleared.is_complete())
    }
}

/// Per-mode cache coverage of a fragment root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentCoverage {
    pub mode: ParsingMode,
    pub fragments: usize,
    /// Fragments with an entry for their current timestamp.
    pub cached: usize,
    /// Fragments with no entry, or only entries for older timestamps.
    pub missing: usize,
}

/// Read-only snapshot of the cache state.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub store_path: Option<PathBuf>,
    pub store_exists: bool,
    pub store_size: u64,
    pub ast_entries: usize,
    pub regex_entries: usize,
    pub memory_ast_populated: bool,
    pub memory_regex_populated: bool,
    pub engine_available: bool,
    pub memory_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coverage: Vec<FragmentCoverage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl VerifyReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn entries(&self, mode: ParsingMode) -> usize {
        match mode {
            ParsingMode::Ast => self.ast_entries,
            ParsingMode::Regex => self.regex_entries,
        }
    }
}

impl CacheService {
    /// Clears the memory tier and the store.
    ///
    /// Each tier is cleared independently; a failure in one does not stop
    /// the other.
    pub fn clear(&mut self, scope: ClearScope, options: ClearOptions) -> ClearReport {
        let memory = self.clear_memory(scope, options.dry_run);

        let mut bytes_removed = 0;
        let mut file_removed = false;
        let store = self.clear_store(scope, options, &mut bytes_removed, &mut file_removed);

        let report = ClearReport {
            scope,
            dry_run: options.dry_run,
            memory,
            store,
            bytes_removed,
            file_removed,
        };

        if report.is_complete() {
            info!(
                "Cleared {} memory entries and {} store rows",
                report.memory.removed, report.store.removed
            );
        } else {
            warn!("Cache clear completed with errors");
        }
        report
    }

    fn clear_memory(&mut self, scope: ClearScope, dry_run: bool) -> StepOutcome {
        if !self.memory.is_enabled() {
            return StepOutcome::skipped("memory", "memory tier disabled");
        }

        let removed = if dry_run {
            scope.modes().iter().map(|&mode| self.memory.count(mode)).sum::<usize>()
        } else {
            self.memory.clear(scope)
        };
        StepOutcome::succeeded("memory", removed)
    }

    fn clear_store(
        &mut self,
        scope: ClearScope,
        options: ClearOptions,
        bytes_removed: &mut u64,
        file_removed: &mut bool,
    ) -> StepOutcome {
        let Some(store) = self.store.as_mut() else {
            return match &self.capabilities().degraded_reason {
                Some(reason) if self.persistence_requested => {
                    StepOutcome::failed("store", reason.clone())
                }
                _ => StepOutcome::skipped("store", "persistence disabled"),
            };
        };

        if options.dry_run {
            let mut removed = 0;
            for &mode in scope.modes() {
                match store.count_entries(mode) {
                    Ok(count) => removed += count,
                    Err(e) => return StepOutcome::failed("store", e.to_string()),
                }
            }
            if options.remove_store_file && scope == ClearScope::All {
                *bytes_removed = store.file_size();
            }
            return StepOutcome::succeeded("store", removed);
        }

        match store.clear(scope, options.remove_store_file) {
            Ok(outcome) => {
                *bytes_removed = outcome.bytes_removed;
                *file_removed = outcome.file_removed;
                if outcome.file_removed {
                    self.schema_ready = false;
                }
                StepOutcome::succeeded("store", outcome.rows_removed)
            }
            Err(e) => StepOutcome::failed("store", e.to_string()),
        }
    }

    /// Resolves every fragment under `root` in both modes.
    ///
    /// A forced build clears the cache first. Fails only when the fragments
    /// cannot be enumerated.
    pub fn build(&mut self, root: &Path, force: bool) -> Result<BuildReport, CoreError> {
        let started = Instant::now();
        let finder = FragmentFinder::from_config(&self.config)?;
        let fragments = finder.discover(root)?;

        let cleared = force.then(|| self.clear(ClearScope::All, ClearOptions::default()));
        let outcome = self.resolve_commands(&fragments, true);

        let mut stale_purged = 0;
        if !self.is_read_only()
            && let Some(store) = self.store.as_mut()
        {
            for mode in ParsingMode::ALL {
                match store.purge_stale(mode) {
                    Ok(purged) => stale_purged += purged,
                    Err(e) => warn!("Failed to purge stale {} entries: {}", mode, e),
                }
            }
        }

        let report = BuildReport {
            root: root.to_path_buf(),
            stats: outcome.stats,
            cleared,
            stale_purged,
            persisted: !self.is_memory_only(),
            elapsed: started.elapsed(),
        };

        info!(
            "Built cache for {} fragments in {:?}",
            report.stats.fragments_discovered, report.elapsed
        );
        Ok(report)
    }

    /// Reports the cache state without changing it.
    ///
    /// With a root, also reports how many of its fragments have a valid
    /// entry in each mode.
    pub fn verify(&mut self, root: Option<&Path>) -> Result<VerifyReport, CoreError> {
        let capabilities = self.capabilities().clone();
        let mut report = VerifyReport {
            store_path: capabilities.store_path,
            store_exists: false,
            store_size: 0,
            ast_entries: 0,
            regex_entries: 0,
            memory_ast_populated: self.memory.count(ParsingMode::Ast) > 0,
            memory_regex_populated: self.memory.count(ParsingMode::Regex) > 0,
            engine_available: capabilities.engine_available,
            memory_only: self.is_memory_only(),
            degraded_reason: capabilities.degraded_reason,
            coverage: Vec::new(),
            errors: Vec::new(),
        };

        if self.persistence_requested && self.store.is_none() {
            report.errors.push(format!(
                "store unavailable: {}",
                report.degraded_reason.as_deref().unwrap_or("unknown reason")
            ));
        }

        if let Some(store) = self.store.as_mut() {
            report.store_exists = store.exists();
            report.store_size = store.file_size();
            for mode in ParsingMode::ALL {
                match store.count_entries(mode) {
                    Ok(count) if mode == ParsingMode::Ast => report.ast_entries = count,
                    Ok(count) => report.regex_entries = count,
                    Err(e) => report
                        .errors
                        .push(format!("failed to count {} entries: {}", mode, e)),
                }
            }
        }

        if let Some(root) = root {
            let finder = FragmentFinder::from_config(&self.config)?;
            let fragments = finder.discover(root)?;

            for mode in ParsingMode::ALL {
                let mut cached = 0;
                for fragment in &fragments {
                    let key = fragment.key(mode);
                    if self.memory.get(&key).is_some() || self.store_lookup(&key).is_some() {
                        cached += 1;
                    }
                }
                report.coverage.push(FragmentCoverage {
                    mode,
                    fragments: fragments.len(),
                    cached,
                    missing: fragments.len() - cached,
                });
            }
        }

        Ok(report)
    }
}
