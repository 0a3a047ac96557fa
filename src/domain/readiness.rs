use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a dependency repository is not in its expected state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BlockingReason {
    DirtyWorkingCopy { changed_paths: Vec<String> },
    WrongBranch { expected: String, actual: String },
    DetachedHead { expected: String },
    ReadFailed { message: String },
}

impl BlockingReason {
    pub fn is_read_failure(&self) -> bool {
        matches!(self, BlockingReason::ReadFailed { .. })
    }
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingReason::DirtyWorkingCopy { .. } => f.write_str("dirty working copy"),
            BlockingReason::WrongBranch { expected, actual } => {
                write!(f, "on branch '{}', expected '{}'", actual, expected)
            }
            BlockingReason::DetachedHead { expected } => {
                write!(f, "detached HEAD, expected '{}'", expected)
            }
            BlockingReason::ReadFailed { message } => write!(f, "read failed: {}", message),
        }
    }
}

/// Observed state of one dependency repository at resolve time.
///
/// `blocking_reason` is set exactly when the repository is dirty, off its
/// expected branch, or could not be read. Build values through
/// [`RepoReadiness::observe`] or [`RepoReadiness::read_failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoReadiness {
    pub repo_id: String,
    pub resolved_ref: Option<String>,
    pub is_clean: bool,
    pub is_on_expected_branch: bool,
    pub blocking_reason: Option<BlockingReason>,
}

impl RepoReadiness {
    /// Assess a repository that was read successfully.
    ///
    /// Branch drift outranks dirt when both apply.
    pub fn observe(
        repo_id: impl Into<String>,
        head: impl Into<String>,
        current_branch: Option<&str>,
        expected_branch: &str,
        changed_paths: Vec<String>,
    ) -> Self {
        let is_clean = changed_paths.is_empty();
        let is_on_expected_branch = current_branch == Some(expected_branch);

        let blocking_reason = match current_branch {
            None => Some(BlockingReason::DetachedHead {
                expected: expected_branch.to_string(),
            }),
            Some(actual) if actual != expected_branch => Some(BlockingReason::WrongBranch {
                expected: expected_branch.to_string(),
                actual: actual.to_string(),
            }),
            Some(_) if !is_clean => Some(BlockingReason::DirtyWorkingCopy { changed_paths }),
            Some(_) => None,
        };

        RepoReadiness {
            repo_id: repo_id.into(),
            resolved_ref: Some(head.into()),
            is_clean,
            is_on_expected_branch,
            blocking_reason,
        }
    }

    /// Record a repository whose state could not be determined.
    pub fn read_failed(repo_id: impl Into<String>, message: impl Into<String>) -> Self {
        RepoReadiness {
            repo_id: repo_id.into(),
            resolved_ref: None,
            is_clean: false,
            is_on_expected_branch: false,
            blocking_reason: Some(BlockingReason::ReadFailed {
                message: message.into(),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.blocking_reason.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_repo_on_branch_is_ready() {
        let r = RepoReadiness::observe("hal-sdl", "abc123", Some("main"), "main", vec![]);
        assert!(r.is_ready());
        assert!(r.is_clean);
        assert!(r.is_on_expected_branch);
        assert_eq!(r.resolved_ref.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_dirty_repo_reports_paths() {
        let r = RepoReadiness::observe(
            "hal-sdl",
            "abc123",
            Some("main"),
            "main",
            vec!["src/lib.c".to_string()],
        );
        assert!(!r.is_clean);
        assert_eq!(
            r.blocking_reason,
            Some(BlockingReason::DirtyWorkingCopy {
                changed_paths: vec!["src/lib.c".to_string()]
            })
        );
        assert_eq!(r.blocking_reason.unwrap().to_string(), "dirty working copy");
    }

    #[test]
    fn test_wrong_branch_outranks_dirt() {
        let r = RepoReadiness::observe(
            "engine",
            "def456",
            Some("feature/x"),
            "main",
            vec!["a.txt".to_string()],
        );
        assert!(!r.is_on_expected_branch);
        assert_eq!(
            r.blocking_reason.unwrap().to_string(),
            "on branch 'feature/x', expected 'main'"
        );
    }

    #[test]
    fn test_detached_head() {
        let r = RepoReadiness::observe("engine", "def456", None, "main", vec![]);
        assert!(matches!(r.blocking_reason, Some(BlockingReason::DetachedHead { .. })));
        assert!(!r.is_on_expected_branch);
    }

    #[test]
    fn test_read_failed_has_no_ref() {
        let r = RepoReadiness::read_failed("assets", "not a git repository");
        assert_eq!(r.resolved_ref, None);
        assert!(r.blocking_reason.as_ref().unwrap().is_read_failure());
        assert_eq!(
            r.blocking_reason.unwrap().to_string(),
            "read failed: not a git repository"
        );
    }
}
