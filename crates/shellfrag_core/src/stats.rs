//! Per-run resolution statistics.

use serde::Serialize;

use shellfrag_cache::ParsingMode;

/// Where a cached entry was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HitTier {
    Memory,
    Store,
}

/// Counters accumulated over one `resolve_commands` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStatistics {
    /// Fragments handed to the orchestrator.
    pub fragments_discovered: usize,
    /// Fragments resolved in every requested mode.
    pub fragments_parsed: usize,
    /// Fragments that could not be read or that an extractor rejected.
    pub fragments_failed: usize,
    /// Sum of per-mode command list lengths.
    pub commands_discovered: usize,
    /// Sum of per-fragment merged command list lengths.
    pub commands_registered: usize,
    /// Cache hits in AST mode, either tier.
    pub ast_cache_hits: usize,
    /// Cache hits in regex mode, either tier.
    pub content_cache_hits: usize,
    pub memory_hits: usize,
    pub store_hits: usize,
    /// Lookups that missed both tiers.
    pub cache_misses: usize,
    pub extractor_invocations: usize,
}

impl ParseStatistics {
    pub(crate) fn record_hit(&mut self, mode: ParsingMode, tier: HitTier) {
        match mode {
            ParsingMode::Ast => self.ast_cache_hits += 1,
            ParsingMode::Regex => self.content_cache_hits += 1,
        }
        match tier {
            HitTier::Memory => self.memory_hits += 1,
            HitTier::Store => self.store_hits += 1,
        }
    }

    /// Total hits across modes.
    pub fn cache_hits(&self) -> usize {
        self.ast_cache_hits + self.content_cache_hits
    }

    /// Fraction of lookups served from either tier, `0.0` when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits() + self.cache_misses;
        if lookups == 0 {
            return 0.0;
        }
        self.cache_hits() as f64 / lookups as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hit() {
        let mut stats = ParseStatistics::default();
        stats.record_hit(ParsingMode::Ast, HitTier::Memory);
        stats.record_hit(ParsingMode::Regex, HitTier::Store);
        stats.record_hit(ParsingMode::Regex, HitTier::Memory);

        assert_eq!(stats.ast_cache_hits, 1);
        assert_eq!(stats.content_cache_hits, 2);
        assert_eq!(stats.memory_hits, 2);
        assert_eq!(stats.store_hits, 1);
        assert_eq!(stats.cache_hits(), 3);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = ParseStatistics::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_hit(ParsingMode::Ast, HitTier::Memory);
        stats.cache_misses = 1;
        assert_eq!(stats.hit_rate(), 0.5);
    }
}
