//! Profile-startup entry point.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::file_finder::FragmentFinder;
use crate::service::{CacheService, FragmentCommands};
use crate::stats::ParseStatistics;

/// The commands to register for a profile.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadedProfile {
    pub fragments: Vec<FragmentCommands>,
    pub stats: ParseStatistics,
    /// Why nothing was loaded, when setup failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadedProfile {
    /// All commands across fragments, in load order.
    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.fragments
            .iter()
            .flat_map(|fragment| fragment.commands.iter().map(String::as_str))
    }
}

/// Resolves a profile's fragments through a [`CacheService`].
pub struct FragmentLoader<'a> {
    service: &'a mut CacheService,
    finder: FragmentFinder,
    force_both_modes: bool,
}

impl<'a> FragmentLoader<'a> {
    pub fn new(service: &'a mut CacheService, finder: FragmentFinder) -> Self {
        Self {
            service,
            finder,
            force_both_modes: false,
        }
    }

    /// Resolves both parsing modes instead of the configured default.
    pub fn force_both_modes(mut self, force: bool) -> Self {
        self.force_both_modes = force;
        self
    }

    /// Loads the fragments under `root`.
    ///
    /// Never fails: if the fragments cannot be enumerated the profile is
    /// empty and the reason is recorded in [`LoadedProfile::error`].
    pub fn load(&mut self, root: &Path) -> LoadedProfile {
        let fragments = match self.finder.discover(root) {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!("Loading profile with no fragments: {}", e);
                return LoadedProfile {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let outcome = self
            .service
            .resolve_commands(&fragments, self.force_both_modes);

        info!(
            "Loaded {} commands from {} fragments",
            outcome.stats.commands_registered, outcome.stats.fragments_parsed
        );

        LoadedProfile {
            fragments: outcome.files,
            stats: outcome.stats,
            error: None,
        }
    }
}
