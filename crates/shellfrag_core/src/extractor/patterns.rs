//! Pattern-based (regex-mode) command discovery.

use std::sync::OnceLock;

use regex::Regex;

use super::{CommandExtractor, ExtractionError, push_unique};

const NAME: &str = r#"['"]?([A-Za-z_][\w\-.]*)['"]?"#;

static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn patterns() -> &'static [Regex] {
    PATTERNS.get_or_init(|| {
        [
            format!(r"(?im)^\s*(?:function|filter|workflow)\s+(?:(?:global|script|local|private):)?{NAME}"),
            format!(r"(?i)\b(?:Set|New)-Alias\s+(?:-Name\s+)?{NAME}"),
            format!(r#"(?i)\bSet-Item\s+(?:-Path\s+)?['"]?Function:(?:(?:global|script):)?{NAME}"#),
            format!(r"(?i)\bSet-AgentMode(?:Function|Alias)\s+-Name\s+{NAME}"),
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("Invalid built-in registration pattern"))
        .collect()
    })
}

/// Matches registration idioms in the raw fragment text.
///
/// Unlike [`DeclarationScanner`](super::DeclarationScanner) this looks at the
/// text line by line without understanding it, so it also sees commands
/// registered through `Set-Alias`, `Set-Item Function:` and the profile's own
/// registration helpers, and never rejects a fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationPatterns;

impl RegistrationPatterns {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExtractor for RegistrationPatterns {
    fn extract(&self, content: &str) -> Result<Vec<String>, ExtractionError> {
        let mut found: Vec<(usize, &str)> = patterns()
            .iter()
            .flat_map(|pattern| pattern.captures_iter(content))
            .filter_map(|captures| captures.get(1))
            .map(|name| (name.start(), name.as_str()))
            .collect();

        // Report names in the order they appear in the text.
        found.sort_by_key(|(offset, _)| *offset);

        let mut names = Vec::new();
        for (_, name) in found {
            push_unique(&mut names, name);
        }
        Ok(names)
    }
}
