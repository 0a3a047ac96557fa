use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use super::FlowContext;
use crate::config::RepoConfig;
use crate::error::{ReleaseError, Result};
use crate::git::WorkingCopy;
use crate::infra::ci::CiGate;
use crate::infra::hosting::{NewPullRequest, PrStatus, PullRequestHandle};
use crate::infra::TimeoutClass;

/// A set of files to land on the base branch through one pull request.
#[derive(Debug, Clone)]
pub(crate) struct ProposedChange {
    pub branch: String,
    pub title: String,
    pub body: String,
    pub paths: Vec<PathBuf>,
    /// Commit time, fixed so that rebuilding the branch yields the same commit
    pub timestamp: DateTime<Utc>,
}

/// Land `change` on the repository's base branch.
///
/// An open pull request for the branch is resumed and a merged one is
/// returned as is. Nothing is force-pushed and a pull request that was
/// opened is never closed: failures after it exists come back as
/// `PublishPartial` with its handle.
#[instrument(skip_all, fields(slug = %repo.slug, branch = %change.branch))]
pub(crate) fn open_and_merge(
    ctx: &FlowContext,
    working_copy: &dyn WorkingCopy,
    repo: &RepoConfig,
    change: &ProposedChange,
) -> Result<PullRequestHandle> {
    let slug = repo.slug.as_str();
    let base = repo.branch.as_str();

    let pull_request = match ctx.hosting.find_pull_request(slug, &change.branch, base)? {
        Some(existing) if existing.status == PrStatus::Merged => {
            info!(pr = existing.number, "pull request already merged");
            return Ok(existing);
        }
        Some(existing) if existing.status == PrStatus::Open => {
            info!(pr = existing.number, "resuming open pull request");
            existing
        }
        _ => open_pull_request(ctx, working_copy, repo, change)?,
    };

    let merged = merge_with_retries(ctx, slug, pull_request)?;
    return_to_base(ctx, working_copy, base);
    Ok(merged)
}

fn open_pull_request(
    ctx: &FlowContext,
    working_copy: &dyn WorkingCopy,
    repo: &RepoConfig,
    change: &ProposedChange,
) -> Result<PullRequestHandle> {
    working_copy.start_branch(&change.branch)?;
    let commit = working_copy.commit_paths(&change.paths, &change.title, change.timestamp)?;

    let remote = ctx.config.remote.git_remote.as_str();
    ctx.policy.write(TimeoutClass::Medium, "push release branch", |timeout| {
        working_copy.push_branch(remote, &change.branch, timeout)
    })?;

    let request = NewPullRequest {
        title: change.title.clone(),
        body: change.body.clone(),
        head: change.branch.clone(),
        base: repo.branch.clone(),
    };
    let mut created = ctx.policy.write(TimeoutClass::Medium, "create pull request", |_| {
        ctx.hosting.create_pull_request(&repo.slug, &request)
    })?;
    if created.head_sha.is_none() {
        created.head_sha = Some(commit);
    }
    info!(pr = created.number, "opened pull request");
    Ok(created)
}

fn merge_with_retries(ctx: &FlowContext, slug: &str, mut pull_request: PullRequestHandle) -> Result<PullRequestHandle> {
    let attempts = ctx.config.publish.merge_attempts;
    let method = ctx.config.remote.merge_method;
    let gate = CiGate::new(ctx.hosting.as_ref(), &ctx.policy, &ctx.ci);
    let mut attempt = 1;

    loop {
        let head = pull_request
            .head_sha
            .clone()
            .unwrap_or_else(|| pull_request.head_branch.clone());
        gate.wait_for_green(slug, &head, Some(&ctx.cancel))
            .map_err(|e| surface(&pull_request, "wait for CI", e))?;

        let number = pull_request.number;
        let merged = ctx.policy.write(TimeoutClass::Medium, "merge pull request", |_| {
            ctx.hosting.merge_pull_request(slug, number, method)
        });

        match merged {
            Ok(commit) => {
                info!(pr = number, %commit, method = method.as_str(), "pull request merged");
                pull_request.status = PrStatus::Merged;
                return Ok(pull_request);
            }
            Err(e @ ReleaseError::MergeConflict { .. }) if attempt < attempts => {
                warn!(pr = number, attempt, error = %e, "merge refused, updating branch and retrying");
                ctx.policy
                    .write(TimeoutClass::Medium, "update pull request branch", |_| {
                        ctx.hosting.update_pull_request_branch(slug, number)
                    })
                    .map_err(|e| surface(&pull_request, "update branch", e))?;
                pull_request = ctx
                    .hosting
                    .pull_request(slug, number)
                    .map_err(|e| surface(&pull_request, "refresh pull request", e))?;
                attempt += 1;
            }
            Err(e) => return Err(surface(&pull_request, "merge", e)),
        }
    }
}

fn surface(pull_request: &PullRequestHandle, step: &str, cause: ReleaseError) -> ReleaseError {
    warn!(pr = pull_request.number, step, error = %cause, "leaving pull request open for manual completion");
    ReleaseError::partial(step, pull_request, cause)
}

/// Switch back to the base branch and pick up the merge. Failures only warn.
fn return_to_base(ctx: &FlowContext, working_copy: &dyn WorkingCopy, base: &str) {
    let remote = ctx.config.remote.git_remote.as_str();
    let timeout = ctx.policy.timeout(TimeoutClass::Medium);
    let result = working_copy
        .checkout_branch(base)
        .and_then(|()| working_copy.pull_fast_forward(remote, base, timeout));
    if let Err(e) = result {
        warn!(base, error = %e, "could not update local base branch after merge");
    }
}
