//! Remote hosting service: permissions, CI status and pull requests.

pub mod github;
pub mod mock;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

pub use github::GitHubClient;
pub use mock::MockHosting;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrStatus {
    Open,
    Merged,
    Closed,
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrStatus::Open => "open",
            PrStatus::Merged => "merged",
            PrStatus::Closed => "closed",
        })
    }
}

/// Durable reference to a pull request opened by a release operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestHandle {
    pub repo_slug: String,
    pub number: u64,
    pub head_branch: String,
    pub base_branch: String,
    pub status: PrStatus,
    #[serde(default)]
    pub head_sha: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl fmt::Display for PullRequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} ({} -> {}, {})",
            self.repo_slug, self.number, self.head_branch, self.base_branch, self.status
        )
    }
}

/// Caller's access level on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Admin,
    Write,
    Read,
    None,
}

impl Permission {
    pub fn can_write(&self) -> bool {
        matches!(self, Permission::Admin | Permission::Write)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Permission::Admin => "admin",
            Permission::Write => "write",
            Permission::Read => "read",
            Permission::None => "no",
        })
    }
}

/// Combined CI verdict for a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiStatus {
    Success,
    Pending,
    Failure,
    /// No checks reported for the commit
    Absent,
}

impl fmt::Display for CiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CiStatus::Success => "success",
            CiStatus::Pending => "pending",
            CiStatus::Failure => "failure",
            CiStatus::Absent => "absent",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    #[default]
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Operations the release flows need from the hosting service.
///
/// Implementations retry reads on transient failures and issue writes
/// exactly once. A merge that the service refuses because the branch is
/// out of date or conflicting is reported as
/// [`ReleaseError::MergeConflict`](crate::error::ReleaseError::MergeConflict).
pub trait HostingApi: Send + Sync {
    fn permission(&self, slug: &str) -> Result<Permission>;

    fn ci_status(&self, slug: &str, git_ref: &str) -> Result<CiStatus>;

    fn pull_request(&self, slug: &str, number: u64) -> Result<PullRequestHandle>;

    /// Most recent pull request from `head` into `base`, in any state.
    fn find_pull_request(&self, slug: &str, head: &str, base: &str) -> Result<Option<PullRequestHandle>>;

    fn create_pull_request(&self, slug: &str, request: &NewPullRequest) -> Result<PullRequestHandle>;

    /// Merge and return the resulting commit id.
    fn merge_pull_request(&self, slug: &str, number: u64, method: MergeMethod) -> Result<String>;

    /// Bring the pull request branch up to date with its base.
    fn update_pull_request_branch(&self, slug: &str, number: u64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_levels() {
        assert!(Permission::Admin.can_write());
        assert!(Permission::Write.can_write());
        assert!(!Permission::Read.can_write());
        assert!(!Permission::None.can_write());
    }

    #[test]
    fn test_handle_display() {
        let handle = PullRequestHandle {
            repo_slug: "acme/app".to_string(),
            number: 7,
            head_branch: "release/app-v1.0.0".to_string(),
            base_branch: "main".to_string(),
            status: PrStatus::Open,
            head_sha: None,
            url: None,
        };
        assert_eq!(handle.to_string(), "acme/app#7 (release/app-v1.0.0 -> main, open)");
    }
}
