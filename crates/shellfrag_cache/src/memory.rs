//! Session-scoped in-memory cache tier.

use std::collections::HashMap;

use crate::store::ClearScope;
use crate::{CacheEntry, CacheKey, ParsingMode};

/// Holds entries already seen in this process.
///
/// This is a copy of what the persistent store holds, never the authority:
/// lookups are by full key, so an entry for an older timestamp is simply
/// never reached once the fragment changes.
#[derive(Debug)]
pub struct MemoryTier {
    /// AST-mode entries.
    ast: HashMap<CacheKey, CacheEntry>,
    /// Regex-mode entries.
    regex: HashMap<CacheKey, CacheEntry>,
    /// Whether the tier is enabled.
    enabled: bool,
}

impl MemoryTier {
    /// Creates an empty, enabled tier.
    pub fn new() -> Self {
        Self {
            ast: HashMap::new(),
            regex: HashMap::new(),
            enabled: true,
        }
    }

    /// Disables the tier; lookups miss and stores are ignored.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Returns whether the tier is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn map(&self, mode: ParsingMode) -> &HashMap<CacheKey, CacheEntry> {
        match mode {
            ParsingMode::Ast => &self.ast,
            ParsingMode::Regex => &self.regex,
        }
    }

    fn map_mut(&mut self, mode: ParsingMode) -> &mut HashMap<CacheKey, CacheEntry> {
        match mode {
            ParsingMode::Ast => &mut self.ast,
            ParsingMode::Regex => &mut self.regex,
        }
    }

    /// Gets the entry for an exact key.
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        if !self.enabled {
            return None;
        }
        self.map(key.mode).get(key)
    }

    /// Stores an entry under its own key.
    pub fn set(&mut self, entry: CacheEntry) {
        if self.enabled {
            let key = entry.key().clone();
            self.map_mut(key.mode).insert(key, entry);
        }
    }

    /// Clears the entries in scope and returns how many were dropped.
    pub fn clear(&mut self, scope: ClearScope) -> usize {
        scope
            .modes()
            .iter()
            .map(|mode| {
                let map = self.map_mut(*mode);
                let count = map.len();
                map.clear();
                count
            })
            .sum()
    }

    /// Returns the number of entries held for a mode.
    pub fn count(&self, mode: ParsingMode) -> usize {
        self.map(mode).len()
    }

    /// Returns the number of entries across both modes.
    pub fn len(&self) -> usize {
        self.ast.len() + self.regex.len()
    }

    /// Returns true if neither mode holds entries.
    pub fn is_empty(&self) -> bool {
        self.ast.is_empty() && self.regex.is_empty()
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}
