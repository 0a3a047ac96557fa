use crate::domain::readiness::BlockingReason;
use crate::error::{ReleaseError, Result};
use regex::Regex;

/// Build byproducts and editor noise that never make a working copy substantively dirty.
pub const DEFAULT_INCIDENTAL_PATHS: &[&str] = &[
    r"(^|/)\.DS_Store$",
    r"(^|/)Thumbs\.db$",
    r"^\.idea/",
    r"^\.vscode/",
    r"(^|/)target/",
    r"(^|/)build/",
    r"\.log$",
    r"\.swp$",
    r"~$",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffClass {
    Substantive,
    Incidental,
}

/// Decides whether a readiness problem should block an `auto-smart` resolution.
pub trait DiffClassifier: Send + Sync {
    fn classify(&self, repo_id: &str, reason: &BlockingReason) -> DiffClass;
}

/// Treats a dirty working copy as incidental when every changed path
/// matches one of the configured patterns. Branch drift and read failures
/// are always substantive.
#[derive(Debug, Clone)]
pub struct IncidentalPathClassifier {
    patterns: Vec<Regex>,
}

impl IncidentalPathClassifier {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    ReleaseError::config(format!("invalid incidental path pattern '{}': {}", p.as_ref(), e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(IncidentalPathClassifier { patterns })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(DEFAULT_INCIDENTAL_PATHS)
    }

    pub fn is_incidental_path(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        self.patterns.iter().any(|p| p.is_match(&normalized))
    }
}

impl DiffClassifier for IncidentalPathClassifier {
    fn classify(&self, _repo_id: &str, reason: &BlockingReason) -> DiffClass {
        match reason {
            BlockingReason::DirtyWorkingCopy { changed_paths }
                if !changed_paths.is_empty()
                    && changed_paths.iter().all(|p| self.is_incidental_path(p)) =>
            {
                DiffClass::Incidental
            }
            _ => DiffClass::Substantive,
        }
    }
}
