//! Git operations abstraction layer
//!
//! This module provides a trait-based abstraction over the working copies a
//! release touches, allowing for real repositories and mock implementations
//! for testing.
//!
//! # Overview
//!
//! - [WorkingCopy]: one checked-out repository. Readiness reads, release
//!   branch creation, committing artifacts and pushing.
//! - [RepoProvider]: opens working copies by repository id.
//!
//! The concrete implementations include:
//!
//! - [repository::Git2WorkingCopy]: local operations through `git2`. Network
//!   operations shell out to `git` so they run under a hard timeout.
//! - [mock::MockWorkingCopy]: scripted state for tests
//!
//! # Usage
//!
//! ```rust,no_run
//! # use release_orchestrator::git::{Git2Provider, RepoProvider};
//! # use release_orchestrator::config::RepoConfig;
//! # fn example(repo: &RepoConfig) -> release_orchestrator::error::Result<()> {
//! let working_copy = Git2Provider.open("engine", repo)?;
//! println!("engine is at {}", working_copy.head_commit()?);
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;

pub use mock::{MockRepoProvider, MockWorkingCopy};
pub use repository::{Git2Provider, Git2WorkingCopy};

use crate::config::RepoConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One local working copy.
///
/// ## Thread Safety
///
/// Implementors must be `Send` so that readiness reads can run on a worker
/// pool. Each working copy is used by one thread at a time.
///
/// ## Error Handling
///
/// Local failures surface as [crate::error::ReleaseError::Git]. Network
/// failures map to `TransientInfra` when they timed out and `Remote` when
/// the remote refused them.
pub trait WorkingCopy: Send {
    /// Root of the working tree
    fn path(&self) -> &Path;

    /// Full id of the commit HEAD points at
    fn head_commit(&self) -> Result<String>;

    /// Checked-out branch name, or `None` on a detached HEAD
    fn current_branch(&self) -> Result<Option<String>>;

    /// Modified, staged and untracked paths relative to the root, ignored files excluded
    fn changed_paths(&self) -> Result<Vec<String>>;

    /// Point `name` at the current HEAD and switch to it, leaving the working tree as is.
    ///
    /// An existing local branch of that name is moved; staying on it is a no-op.
    fn start_branch(&self, name: &str) -> Result<()>;

    /// Commit exactly `paths` (relative to the root) onto the current branch.
    ///
    /// Missing files are recorded as deletions. The commit is stamped with
    /// `timestamp` so that repeating the same commit yields the same id.
    /// Returns HEAD unchanged when there is nothing to commit.
    fn commit_paths(&self, paths: &[PathBuf], message: &str, timestamp: DateTime<Utc>) -> Result<String>;

    /// Push a local branch to the same name on `remote`. Never forces.
    fn push_branch(&self, remote: &str, branch: &str, timeout: Duration) -> Result<()>;

    /// Safely switch to an existing local branch.
    fn checkout_branch(&self, name: &str) -> Result<()>;

    /// Fast-forward the current branch from `remote`.
    fn pull_fast_forward(&self, remote: &str, branch: &str, timeout: Duration) -> Result<()>;
}

/// Opens working copies by repository id.
pub trait RepoProvider: Send + Sync {
    fn open(&self, repo_id: &str, repo: &RepoConfig) -> Result<Box<dyn WorkingCopy>>;
}
