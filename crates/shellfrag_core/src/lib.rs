//! # shellfrag_core
//!
//! Cached command discovery for shell-profile fragments.
//!
//! This crate provides:
//! - Configuration loading
//! - Fragment discovery and filtering
//! - The `CacheService` orchestrator (memory tier, persistent store, extractors)
//! - Maintenance operations (clear, build, verify)
//! - The `FragmentLoader` used at profile startup
//!
//! ## Example
//!
//! ```rust,ignore
//! use shellfrag_core::{CacheService, FragmentCacheConfig, FragmentFinder, FragmentLoader};
//!
//! let config = FragmentCacheConfig::from_file(".shellfrag.json")?;
//! let finder = FragmentFinder::from_config(&config)?;
//! let mut service = CacheService::builder(config).build();
//!
//! let profile = FragmentLoader::new(&mut service, finder).load("profile.d".as_ref());
//! for fragment in &profile.fragments {
//!     println!("{}: {:?}", fragment.path.display(), fragment.commands);
//! }
//! ```

mod config;
mod error;
pub mod extractor;
pub mod file_finder;
mod loader;
mod maintenance;
mod service;
mod stats;

#[cfg(test)]
pub mod test_utils;

pub use config::FragmentCacheConfig;
pub use error::CoreError;
pub use extractor::{
    CommandExtractor, DeclarationScanner, ExtractionError, Extractors, RegistrationPatterns,
};
pub use file_finder::{FragmentDescriptor, FragmentFinder};
pub use loader::{FragmentLoader, LoadedProfile};
pub use maintenance::{
    BuildReport, ClearOptions, ClearReport, FragmentCoverage, StepOutcome, StepStatus,
    VerifyReport,
};
pub use service::{
    CacheService, CacheServiceBuilder, Capabilities, FragmentCommands, ResolveOutcome,
    merge_commands,
};
pub use stats::ParseStatistics;

pub use shellfrag_cache::{CacheEntry, CacheKey, ClearScope, ParsingMode};
