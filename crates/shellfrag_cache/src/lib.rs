//! # shellfrag_cache
//!
//! Parse cache for shell-profile fragments.
//!
//! This crate avoids re-discovering the commands of profile fragments that
//! have not changed since they were last parsed.
//!
//! ## Cache Strategy
//!
//! 1. **Keyed by timestamp**: an entry is identified by the fragment path, its
//!    last-write time in ticks and the parsing mode that produced it
//! 2. **Exact invalidation**: any change of the last-write time is a miss
//! 3. **Mode isolation**: AST and regex results never answer for each other
//!
//! ## Storage
//!
//! Two tiers are provided: a session-scoped [`MemoryTier`] and a
//! [`FragmentStore`] backed by a single SQLite file shared by every shell
//! session on the host.

mod entry;
mod error;
mod key;
mod memory;
pub mod store;

pub use entry::CacheEntry;
pub use error::CacheError;
pub use key::{CacheKey, ParsingMode, normalize_path, system_time_to_ticks, ticks_now};
pub use memory::MemoryTier;
pub use store::{ClearScope, FragmentStore, StoreClearOutcome, resolve_store_path};
