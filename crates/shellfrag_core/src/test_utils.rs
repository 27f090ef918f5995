use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use crate::extractor::{
    CommandExtractor, DeclarationScanner, ExtractionError, Extractors, RegistrationPatterns,
};

/// Marker that makes [`CountingExtractor`] reject a fragment.
pub const FAIL_MARKER: &str = "#fail";

/// Wraps an extractor and counts its invocations.
///
/// Content containing [`FAIL_MARKER`] is rejected.
pub struct CountingExtractor {
    inner: Box<dyn CommandExtractor>,
    calls: Arc<AtomicUsize>,
}

impl CommandExtractor for CountingExtractor {
    fn extract(&self, content: &str) -> Result<Vec<String>, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if content.contains(FAIL_MARKER) {
            return Err(ExtractionError::Failed("fragment rejected".to_string()));
        }
        self.inner.extract(content)
    }
}

/// Invocation counters for the extractors built by [`counting_extractors`].
#[derive(Clone, Default)]
pub struct ExtractorCalls {
    pub ast: Arc<AtomicUsize>,
    pub regex: Arc<AtomicUsize>,
}

impl ExtractorCalls {
    pub fn ast(&self) -> usize {
        self.ast.load(Ordering::SeqCst)
    }

    pub fn regex(&self) -> usize {
        self.regex.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.ast() + self.regex()
    }
}

/// Built-in extractors wrapped with invocation counters.
pub fn counting_extractors() -> (Extractors, ExtractorCalls) {
    let calls = ExtractorCalls::default();
    let extractors = Extractors::new(
        Box::new(CountingExtractor {
            inner: Box::new(DeclarationScanner::new()),
            calls: Arc::clone(&calls.ast),
        }),
        Box::new(CountingExtractor {
            inner: Box::new(RegistrationPatterns::new()),
            calls: Arc::clone(&calls.regex),
        }),
    );
    (extractors, calls)
}

/// Writes a fragment and pins its modification time `secs` seconds after a fixed instant.
pub fn write_fragment(dir: &Path, name: &str, content: &str, secs: u64) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    set_mtime(&path, secs);
    path
}

/// Pins a file's modification time `secs` seconds after a fixed instant.
pub fn set_mtime(path: &Path, secs: u64) {
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(base + Duration::from_secs(secs))
        .unwrap();
}
