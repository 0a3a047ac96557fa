use crate::config::RepoConfig;
use crate::error::{ReleaseError, Result};
use crate::git::{RepoProvider, WorkingCopy};
use crate::infra::process::run_command_with_timeout;
use chrono::{DateTime, Utc};
use git2::build::CheckoutBuilder;
use git2::{BranchType, Repository as Git2Repo, Signature, Status, StatusOptions, Time};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

const FALLBACK_NAME: &str = "release-orchestrator";
const FALLBACK_EMAIL: &str = "release-orchestrator@localhost";

/// Wrapper around git2::Repository with our trait interface
pub struct Git2WorkingCopy {
    repo: Git2Repo,
    root: PathBuf,
}

impl Git2WorkingCopy {
    /// Open the repository rooted at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Git2Repo::open(path.as_ref())?;
        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| ReleaseError::config(format!("{} is a bare repository", path.as_ref().display())))?;
        Ok(Git2WorkingCopy { repo, root })
    }

    fn signature(&self, timestamp: DateTime<Utc>) -> Result<Signature<'static>> {
        let time = Time::new(timestamp.timestamp(), 0);
        let (name, email) = match self.repo.signature() {
            Ok(sig) => (
                sig.name().unwrap_or(FALLBACK_NAME).to_string(),
                sig.email().unwrap_or(FALLBACK_EMAIL).to_string(),
            ),
            Err(_) => {
                debug!("no git identity configured, using fallback signature");
                (FALLBACK_NAME.to_string(), FALLBACK_EMAIL.to_string())
            }
        };
        Ok(Signature::new(&name, &email, &time)?)
    }

    fn run_git(&self, operation: &str, args: &[&str], timeout: Duration) -> Result<()> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.root).args(args);
        let output = run_command_with_timeout(cmd, timeout)?;
        if output.timed_out {
            return Err(ReleaseError::transient(
                operation,
                format!("timed out after {}s", timeout.as_secs()),
            ));
        }
        if !output.status.success() {
            return Err(ReleaseError::remote(operation, None, output.diagnostic()));
        }
        Ok(())
    }
}

impl WorkingCopy for Git2WorkingCopy {
    fn path(&self) -> &Path {
        &self.root
    }

    fn head_commit(&self) -> Result<String> {
        Ok(self.repo.head()?.peel_to_commit()?.id().to_string())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        if self.repo.head_detached()? {
            return Ok(None);
        }
        Ok(self.repo.head()?.shorthand().map(str::to_string))
    }

    fn changed_paths(&self) -> Result<Vec<String>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut paths: Vec<String> = statuses
            .iter()
            .filter(|entry| entry.status() != Status::CURRENT && !entry.status().is_ignored())
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn start_branch(&self, name: &str) -> Result<()> {
        if self.current_branch()?.as_deref() == Some(name) {
            return Ok(());
        }
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(name, &head, true)?;
        self.repo.set_head(&format!("refs/heads/{}", name))?;
        debug!(branch = name, commit = %head.id(), "switched to release branch");
        Ok(())
    }

    fn commit_paths(&self, paths: &[PathBuf], message: &str, timestamp: DateTime<Utc>) -> Result<String> {
        let mut index = self.repo.index()?;
        for path in paths {
            if self.root.join(path).exists() {
                index.add_path(path)?;
            } else {
                index.remove_path(path)?;
            }
        }
        index.write()?;

        let tree_id = index.write_tree()?;
        let parent = self.repo.head()?.peel_to_commit()?;
        if parent.tree_id() == tree_id {
            debug!("nothing to commit");
            return Ok(parent.id().to_string());
        }

        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature(timestamp)?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &[&parent])?;
        info!(commit = %oid, "committed release artifacts");
        Ok(oid.to_string())
    }

    fn push_branch(&self, remote: &str, branch: &str, timeout: Duration) -> Result<()> {
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        self.run_git("git push", &["push", remote, &refspec], timeout)?;
        info!(remote, branch, "pushed branch");
        Ok(())
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        let branch = self.repo.find_branch(name, BranchType::Local)?;
        let refname = branch
            .get()
            .name()
            .map(str::to_string)
            .ok_or_else(|| ReleaseError::validation(format!("branch '{}' has a non-UTF-8 name", name)))?;
        let target = branch.get().peel_to_commit()?;
        self.repo
            .checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))?;
        self.repo.set_head(&refname)?;
        Ok(())
    }

    fn pull_fast_forward(&self, remote: &str, branch: &str, timeout: Duration) -> Result<()> {
        self.run_git("git pull", &["pull", "--ff-only", remote, branch], timeout)
    }
}

/// Opens working copies with `git2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Provider;

impl RepoProvider for Git2Provider {
    fn open(&self, _repo_id: &str, repo: &RepoConfig) -> Result<Box<dyn WorkingCopy>> {
        Ok(Box::new(Git2WorkingCopy::open(&repo.path)?))
    }
}
