use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{BlockedError, Channel};
use crate::infra::hosting::{CiStatus, Permission, PullRequestHandle};
use crate::infra::lock::LockOwner;

/// Process exit codes shared by every subcommand.
pub const EXIT_OK: u8 = 0;
pub const EXIT_VALIDATION: u8 = 1;
pub const EXIT_BLOCKED: u8 = 2;
pub const EXIT_NOT_READY: u8 = 3;
pub const EXIT_PERMISSION: u8 = 4;
pub const EXIT_PUBLISH_FAILED: u8 = 5;

/// Unified error type for release operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Release blocked: {0}")]
    Blocked(#[from] BlockedError),

    #[error("Permission denied: {permission} access to {slug}, write access is required")]
    Permission { slug: String, permission: Permission },

    #[error(
        "CI not ready for {slug}@{git_ref} after {}s (last status: {status})",
        .waited.as_secs()
    )]
    CiNotReady {
        slug: String,
        git_ref: String,
        status: CiStatus,
        waited: Duration,
    },

    #[error("CI failed for {slug}@{git_ref}")]
    CiFailed { slug: String, git_ref: String },

    #[error("{operation} failed after {attempts} attempt(s): {message}")]
    TransientInfra {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("{operation} rejected by remote{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Remote {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Pull request {slug}#{number} cannot be merged: {message}")]
    MergeConflict {
        slug: String,
        number: u64,
        message: String,
    },

    #[error("Publish incomplete at step '{step}': {message}. Pull request left open: {handle}")]
    PublishPartial {
        step: String,
        handle: Box<PullRequestHandle>,
        message: String,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Release lock for channel '{channel}' is held by {owner}")]
    LockHeld { channel: Channel, owner: LockOwner },

    #[error(
        "Repository '{repo}' has uncommitted changes unrelated to the release: {}",
        .paths.join(", ")
    )]
    UncommittedChanges { repo: String, paths: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hook error: {0}")]
    Hook(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results in release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    /// Create a validation error with context
    pub fn validation(msg: impl Into<String>) -> Self {
        ReleaseError::Validation(msg.into())
    }

    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        ReleaseError::Config(msg.into())
    }

    /// Create a hook error with context
    pub fn hook(msg: impl Into<String>) -> Self {
        ReleaseError::Hook(msg.into())
    }

    /// Create a transient infrastructure error for a single failed attempt
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ReleaseError::TransientInfra {
            operation: operation.into(),
            attempts: 1,
            message: message.into(),
        }
    }

    /// Create a permanent remote rejection
    pub fn remote(operation: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        ReleaseError::Remote {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    /// Wrap a failure that happened after a pull request was opened.
    pub fn partial(step: impl Into<String>, handle: &PullRequestHandle, cause: ReleaseError) -> Self {
        ReleaseError::PublishPartial {
            step: step.into(),
            handle: Box::new(handle.clone()),
            message: cause.to_string(),
        }
    }

    /// Whether a bounded read retry may re-issue the failed call.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReleaseError::TransientInfra { .. })
    }

    /// Whether re-invoking the same operation later can succeed without operator changes.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            ReleaseError::CiNotReady { .. }
                | ReleaseError::TransientInfra { .. }
                | ReleaseError::LockHeld { .. }
        )
    }

    /// The pull request left behind by a partially completed publish, if any.
    pub fn pull_request(&self) -> Option<&PullRequestHandle> {
        match self {
            ReleaseError::PublishPartial { handle, .. } => Some(handle),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            ReleaseError::Validation(_) | ReleaseError::Config(_) => EXIT_VALIDATION,
            ReleaseError::Blocked(_)
            | ReleaseError::CiFailed { .. }
            | ReleaseError::LockHeld { .. }
            | ReleaseError::UncommittedChanges { .. } => EXIT_BLOCKED,
            ReleaseError::CiNotReady { .. }
            | ReleaseError::TransientInfra { .. }
            | ReleaseError::Cancelled(_) => EXIT_NOT_READY,
            ReleaseError::Permission { .. } => EXIT_PERMISSION,
            ReleaseError::PublishPartial { .. }
            | ReleaseError::Remote { .. }
            | ReleaseError::MergeConflict { .. }
            | ReleaseError::Write { .. }
            | ReleaseError::Hook(_)
            | ReleaseError::Git(_)
            | ReleaseError::Io(_)
            | ReleaseError::Json(_) => EXIT_PUBLISH_FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::hosting::PrStatus;

    fn handle() -> PullRequestHandle {
        PullRequestHandle {
            repo_slug: "acme/app".to_string(),
            number: 42,
            head_branch: "release/app-v1.5.0".to_string(),
            base_branch: "main".to_string(),
            status: PrStatus::Open,
            head_sha: None,
            url: None,
        }
    }

    #[test]
    fn test_error_display() {
        let err = ReleaseError::config("missing [channels.app]");
        assert_eq!(err.to_string(), "Configuration error: missing [channels.app]");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ReleaseError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert_eq!(err.exit_code(), EXIT_PUBLISH_FAILED);
    }

    #[test]
    fn test_exit_codes_follow_taxonomy() {
        assert_eq!(ReleaseError::validation("x").exit_code(), EXIT_VALIDATION);
        assert_eq!(
            ReleaseError::Permission {
                slug: "acme/app".to_string(),
                permission: Permission::Read,
            }
            .exit_code(),
            EXIT_PERMISSION
        );
        assert_eq!(ReleaseError::transient("ci status", "503").exit_code(), EXIT_NOT_READY);
        assert_eq!(
            ReleaseError::CiFailed {
                slug: "acme/app".to_string(),
                git_ref: "abc".to_string(),
            }
            .exit_code(),
            EXIT_BLOCKED
        );
    }

    #[test]
    fn test_partial_error_carries_handle() {
        let cause = ReleaseError::remote("merge pull request", Some(422), "validation failed");
        let err = ReleaseError::partial("merge", &handle(), cause);
        assert_eq!(err.exit_code(), EXIT_PUBLISH_FAILED);
        assert_eq!(err.pull_request().map(|h| h.number), Some(42));
        let msg = err.to_string();
        assert!(msg.contains("acme/app#42"), "got: {msg}");
        assert!(msg.contains("HTTP 422"), "got: {msg}");
    }

    #[test]
    fn test_only_transient_errors_are_retryable_reads() {
        assert!(ReleaseError::transient("pr status", "timeout").is_transient());
        assert!(!ReleaseError::remote("pr status", Some(404), "Not Found").is_transient());
        assert!(!ReleaseError::validation("bad").is_transient());
    }

    #[test]
    fn test_uncommitted_changes_names_paths() {
        let err = ReleaseError::UncommittedChanges {
            repo: "app".to_string(),
            paths: vec!["src/main.c".to_string(), "README.md".to_string()],
        };
        assert!(err.to_string().contains("src/main.c, README.md"));
    }
}
