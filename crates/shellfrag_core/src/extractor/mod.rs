//! Command extractors.
//!
//! Extractors are pure functions of fragment content: they never touch the
//! file system and know nothing about caching.

mod declarations;
mod patterns;

use thiserror::Error;

use shellfrag_cache::ParsingMode;

pub use declarations::DeclarationScanner;
pub use patterns::RegistrationPatterns;

/// Errors reported by an extractor for one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The fragment is not well formed.
    #[error("{message} (line {line})")]
    Syntax { line: usize, message: String },

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl ExtractionError {
    /// Creates a syntax error at a 1-based line.
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// Discovers the command names defined by a fragment.
pub trait CommandExtractor: Send + Sync {
    /// Returns command names in first-seen order, without duplicates.
    fn extract(&self, content: &str) -> Result<Vec<String>, ExtractionError>;
}

/// The extractor bound to each parsing mode.
pub struct Extractors {
    ast: Box<dyn CommandExtractor>,
    regex: Box<dyn CommandExtractor>,
}

impl Extractors {
    pub fn new(ast: Box<dyn CommandExtractor>, regex: Box<dyn CommandExtractor>) -> Self {
        Self { ast, regex }
    }

    /// The built-in declaration scanner and registration patterns.
    pub fn builtin() -> Self {
        Self::new(
            Box::new(DeclarationScanner::new()),
            Box::new(RegistrationPatterns::new()),
        )
    }

    pub fn get(&self, mode: ParsingMode) -> &dyn CommandExtractor {
        match mode {
            ParsingMode::Ast => self.ast.as_ref(),
            ParsingMode::Regex => self.regex.as_ref(),
        }
    }
}

impl Default for Extractors {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Appends `name` unless an equal name (ignoring ASCII case) is present.
pub(crate) fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|existing| existing.eq_ignore_ascii_case(name)) {
        names.push(name.to_string());
    }
}
