use std::path::Path;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::merge::{open_and_merge, ProposedChange};
use super::{ensure_no_unrelated_changes, FlowContext};
use crate::domain::ReleasePlan;
use crate::error::{ReleaseError, Result};
use crate::hooks::HookType;
use crate::infra::artifacts::{read_plan, render_pull_request_body, ArtifactSet};
use crate::infra::hosting::PullRequestHandle;
use crate::infra::ledger::PublishedLedger;
use crate::infra::lock::ReleaseLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Proceed even when the target has changes the release does not own
    pub allow_dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishOutcome {
    pub plan: ReleasePlan,
    pub pull_request: PullRequestHandle,
    /// The plan had been published before; nothing was changed remotely
    pub already_published: bool,
}

/// Publish a prepared plan through a pull request on the target repository.
///
/// Safe to re-run after any failure: a published plan is recognised from
/// the ledger, an open pull request for the release branch is resumed, and
/// the release commit is reproducible so the branch is never rewritten.
#[instrument(skip(ctx, options))]
pub fn publish(ctx: &FlowContext, plan_path: &Path, options: PublishOptions) -> Result<PublishOutcome> {
    let plan = read_plan(plan_path)?;
    let channel = plan.channel;
    let plan_id = plan.id();

    let lock = ReleaseLock::acquire(&ctx.config.state_dir, channel, "publish")?;
    if let Some(stale) = lock.recovered() {
        warn!(%stale, "took over a stale release lock");
    }

    let mut ledger = PublishedLedger::load(&ctx.config.state_dir, channel)?;
    if let Some(release) = ledger.find(&plan_id) {
        info!(%plan_id, pr = release.pull_request.number, "plan already published, nothing to do");
        return Ok(PublishOutcome {
            pull_request: release.pull_request.clone(),
            plan,
            already_published: true,
        });
    }
    // Another release may have landed since this plan was resolved.
    ledger.ensure_advances(&plan)?;

    let (target_id, repo, working_copy) = ctx.open_target(channel)?;
    let artifacts = ArtifactSet::new(working_copy.path(), &ctx.config.release_dir, channel);
    artifacts.verify(&plan)?;
    ensure_no_unrelated_changes(ctx, target_id, working_copy.as_ref(), &artifacts, options.allow_dirty)?;

    ctx.run_hook(HookType::PrePublish, &plan, plan_path, None)?;

    let change = ProposedChange {
        branch: plan.release_branch(ledger.removed_count(&plan_id)),
        title: plan.release_title(),
        body: render_pull_request_body(&plan),
        paths: artifacts.relative_paths(),
        timestamp: plan.created_at,
    };
    let pull_request = open_and_merge(ctx, working_copy.as_ref(), repo, &change)?;

    ledger.record_published(plan.clone(), pull_request.clone(), Utc::now());
    ledger
        .save()
        .map_err(|e| ReleaseError::partial("record published release", &pull_request, e))?;
    info!(version = %plan.version, %plan_id, pr = pull_request.number, "release published");

    ctx.run_hook(HookType::PostPublish, &plan, plan_path, Some(pull_request.number))?;

    Ok(PublishOutcome {
        plan,
        pull_request,
        already_published: false,
    })
}
