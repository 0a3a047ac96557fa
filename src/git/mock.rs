use crate::config::RepoConfig;
use crate::error::{ReleaseError, Result};
use crate::git::{RepoProvider, WorkingCopy};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A commit recorded by [`MockWorkingCopy::commit_paths`]
#[derive(Debug, Clone, PartialEq)]
pub struct MockCommit {
    pub id: String,
    pub branch: Option<String>,
    pub message: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct MockState {
    head: String,
    branch: Option<String>,
    changed: Vec<String>,
    commits: Vec<MockCommit>,
    pushes: Vec<String>,
    read_error: Option<String>,
    push_error: Option<String>,
}

/// Mock working copy for testing without actual git operations
///
/// Clones share state, so a test can keep one handle while the code under
/// test works through another. Files under `path` are real; branch, HEAD and
/// changed paths are scripted.
#[derive(Debug, Clone)]
pub struct MockWorkingCopy {
    root: PathBuf,
    state: Arc<Mutex<MockState>>,
}

impl MockWorkingCopy {
    /// Create a clean mock on `branch` at commit `head`
    pub fn new(root: impl Into<PathBuf>, head: &str, branch: &str) -> Self {
        MockWorkingCopy {
            root: root.into(),
            state: Arc::new(Mutex::new(MockState {
                head: head.to_string(),
                branch: Some(branch.to_string()),
                ..MockState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_changes(self, paths: &[&str]) -> Self {
        self.state().changed = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn detached(self) -> Self {
        self.state().branch = None;
        self
    }

    pub fn failing_reads(self, message: &str) -> Self {
        self.state().read_error = Some(message.to_string());
        self
    }

    pub fn failing_push(self, message: &str) -> Self {
        self.state().push_error = Some(message.to_string());
        self
    }

    pub fn set_head(&self, head: &str) {
        self.state().head = head.to_string();
    }

    pub fn set_changes(&self, paths: &[&str]) {
        self.state().changed = paths.iter().map(|p| p.to_string()).collect();
    }

    pub fn clear_push_failure(&self) {
        self.state().push_error = None;
    }

    pub fn commits(&self) -> Vec<MockCommit> {
        self.state().commits.clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.state().pushes.clone()
    }

    pub fn branch(&self) -> Option<String> {
        self.state().branch.clone()
    }

    fn check_read(&self) -> Result<()> {
        match &self.state().read_error {
            Some(message) => Err(ReleaseError::Git(git2::Error::from_str(message))),
            None => Ok(()),
        }
    }
}

impl WorkingCopy for MockWorkingCopy {
    fn path(&self) -> &Path {
        &self.root
    }

    fn head_commit(&self) -> Result<String> {
        self.check_read()?;
        Ok(self.state().head.clone())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        self.check_read()?;
        Ok(self.state().branch.clone())
    }

    fn changed_paths(&self) -> Result<Vec<String>> {
        self.check_read()?;
        Ok(self.state().changed.clone())
    }

    fn start_branch(&self, name: &str) -> Result<()> {
        self.state().branch = Some(name.to_string());
        Ok(())
    }

    fn commit_paths(&self, paths: &[PathBuf], message: &str, _timestamp: DateTime<Utc>) -> Result<String> {
        let mut state = self.state();
        let id = format!("commit-{}", state.commits.len() + 1);
        let commit = MockCommit {
            id: id.clone(),
            branch: state.branch.clone(),
            message: message.to_string(),
            paths: paths.to_vec(),
        };
        state.commits.push(commit);
        state
            .changed
            .retain(|changed| !paths.iter().any(|p| Path::new(changed) == p.as_path()));
        state.head = id.clone();
        Ok(id)
    }

    fn push_branch(&self, remote: &str, branch: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.state();
        if let Some(message) = &state.push_error {
            return Err(ReleaseError::remote("git push", None, message.clone()));
        }
        state.pushes.push(format!("{} {}", remote, branch));
        Ok(())
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        self.state().branch = Some(name.to_string());
        Ok(())
    }

    fn pull_fast_forward(&self, _remote: &str, _branch: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// Hands out [`MockWorkingCopy`] clones by repository id.
#[derive(Debug, Clone, Default)]
pub struct MockRepoProvider {
    repos: HashMap<String, MockWorkingCopy>,
}

impl MockRepoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(mut self, repo_id: &str, working_copy: MockWorkingCopy) -> Self {
        self.repos.insert(repo_id.to_string(), working_copy);
        self
    }

    pub fn get(&self, repo_id: &str) -> Option<&MockWorkingCopy> {
        self.repos.get(repo_id)
    }
}

impl RepoProvider for MockRepoProvider {
    fn open(&self, repo_id: &str, _repo: &RepoConfig) -> Result<Box<dyn WorkingCopy>> {
        self.repos
            .get(repo_id)
            .map(|wc| Box::new(wc.clone()) as Box<dyn WorkingCopy>)
            .ok_or_else(|| ReleaseError::Git(git2::Error::from_str(&format!("no working copy for '{}'", repo_id))))
    }
}
