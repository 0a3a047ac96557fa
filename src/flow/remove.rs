use std::path::Path;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::merge::{open_and_merge, ProposedChange};
use super::publish::PublishOptions;
use super::{ensure_no_unrelated_changes, FlowContext};
use crate::domain::ReleasePlan;
use crate::error::{ReleaseError, Result};
use crate::hooks::HookType;
use crate::infra::artifacts::{read_plan, render_removal_body, ArtifactSet};
use crate::infra::hosting::PullRequestHandle;
use crate::infra::ledger::PublishedLedger;
use crate::infra::lock::ReleaseLock;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOutcome {
    pub plan: ReleasePlan,
    pub pull_request: PullRequestHandle,
    /// Release whose artifacts are live again, if there was one
    pub restored: Option<ReleasePlan>,
}

/// Revert the most recent published release of a channel.
///
/// The previous release's artifacts are restored, or the artifacts are
/// deleted when there is none, and the change lands through a pull request
/// exactly like a publish.
#[instrument(skip(ctx, options))]
pub fn remove(ctx: &FlowContext, plan_path: &Path, options: PublishOptions) -> Result<RemoveOutcome> {
    let plan = read_plan(plan_path)?;
    let channel = plan.channel;
    let plan_id = plan.id();

    let lock = ReleaseLock::acquire(&ctx.config.state_dir, channel, "remove")?;
    if let Some(stale) = lock.recovered() {
        warn!(%stale, "took over a stale release lock");
    }

    let mut ledger = PublishedLedger::load(&ctx.config.state_dir, channel)?;
    match ledger.last_published() {
        Some(latest) if latest.plan.id() == plan_id => {}
        Some(latest) => {
            return Err(ReleaseError::validation(format!(
                "only the latest {} release can be removed; v{} was published after v{}",
                channel, latest.plan.version, plan.version
            )))
        }
        None => {
            return Err(ReleaseError::validation(format!(
                "plan {} (v{}) is not a published {} release",
                plan_id, plan.version, channel
            )))
        }
    }
    let restored = ledger.previous(&plan_id).map(|r| r.plan.clone());

    let (target_id, repo, working_copy) = ctx.open_target(channel)?;
    let artifacts = ArtifactSet::new(working_copy.path(), &ctx.config.release_dir, channel);
    ensure_no_unrelated_changes(ctx, target_id, working_copy.as_ref(), &artifacts, options.allow_dirty)?;

    match &restored {
        Some(previous) => {
            artifacts.write_all(previous)?;
        }
        None => {
            artifacts.delete_all()?;
        }
    }

    let change = ProposedChange {
        branch: plan.revert_branch(ledger.removed_count(&plan_id)),
        title: plan.revert_title(),
        body: render_removal_body(&plan, restored.as_ref()),
        paths: artifacts.relative_paths(),
        timestamp: plan.created_at,
    };
    let pull_request = open_and_merge(ctx, working_copy.as_ref(), repo, &change)?;

    ledger.mark_removed(&plan_id, pull_request.clone(), Utc::now());
    ledger
        .save()
        .map_err(|e| ReleaseError::partial("record removal", &pull_request, e))?;
    info!(version = %plan.version, %plan_id, pr = pull_request.number, "release removed");

    ctx.run_hook(HookType::PostRemove, &plan, plan_path, Some(pull_request.number))?;

    Ok(RemoveOutcome {
        plan,
        pull_request,
        restored,
    })
}
