use std::path::PathBuf;

use tracing::{info, instrument, warn};

use super::FlowContext;
use crate::domain::{Channel, ReleasePlan, RequestedChange};
use crate::error::{ReleaseError, Result};
use crate::infra::artifacts::ArtifactSet;
use crate::infra::ledger::PublishedLedger;
use crate::infra::lock::ReleaseLock;
use crate::resolve::ResolveRequest;

/// Where the plan to prepare comes from.
#[derive(Debug, Clone)]
pub enum PlanSource {
    /// Reuse the prepared plan on disk when it matches, otherwise resolve.
    Resolve { request: ResolveRequest, re_resolve: bool },
    /// A plan that was already resolved and confirmed.
    Resolved(ReleasePlan),
}

impl PlanSource {
    fn channel(&self) -> Channel {
        match self {
            PlanSource::Resolve { request, .. } => request.channel,
            PlanSource::Resolved(plan) => plan.channel,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrepareOutcome {
    pub plan: ReleasePlan,
    pub plan_path: PathBuf,
    /// Artifact files whose content changed
    pub files_written: usize,
    /// Whether the plan already on disk was kept
    pub reused: bool,
}

/// Write the release artifacts for a plan into the target working copy.
///
/// Holds the channel lock while it runs. Preparing the same plan twice
/// rewrites nothing.
#[instrument(skip_all, fields(channel = %source.channel()))]
pub fn prepare(ctx: &FlowContext, source: PlanSource) -> Result<PrepareOutcome> {
    let channel = source.channel();
    let (_, repo) = ctx.config.target(channel)?;

    let lock = ReleaseLock::acquire(&ctx.config.state_dir, channel, "prepare")?;
    if let Some(stale) = lock.recovered() {
        warn!(%stale, "took over a stale release lock");
    }

    let artifacts = ArtifactSet::new(&repo.path, &ctx.config.release_dir, channel);
    let (plan, reused) = match source {
        PlanSource::Resolved(plan) => {
            PublishedLedger::load(&ctx.config.state_dir, channel)?.ensure_advances(&plan)?;
            (plan, false)
        }
        PlanSource::Resolve { request, re_resolve } => match reusable_plan(ctx, &artifacts, &request, re_resolve)? {
            Some(existing) => (existing, true),
            None => (ctx.resolver().resolve(&request)?, false),
        },
    };

    let files_written = artifacts.write_all(&plan)?;
    info!(version = %plan.version, plan_id = %plan.id(), files_written, reused, "plan prepared");

    Ok(PrepareOutcome {
        plan,
        plan_path: artifacts.plan_path(),
        files_written,
        reused,
    })
}

/// The prepared plan on disk, if it may stand in for a fresh resolution.
fn reusable_plan(
    ctx: &FlowContext,
    artifacts: &ArtifactSet,
    request: &ResolveRequest,
    re_resolve: bool,
) -> Result<Option<ReleasePlan>> {
    if re_resolve {
        return Ok(None);
    }
    let Some(existing) = artifacts.existing_plan()? else {
        return Ok(None);
    };

    let ledger = PublishedLedger::load(&ctx.config.state_dir, existing.channel)?;
    if ledger.find(&existing.id()).is_some() {
        info!(plan_id = %existing.id(), "prepared plan is already published, resolving again");
        return Ok(None);
    }
    if let Err(e) = ledger.ensure_advances(&existing) {
        info!(plan_id = %existing.id(), error = %e, "prepared plan was overtaken, resolving again");
        return Ok(None);
    }

    let version_differs = match &request.change {
        RequestedChange::Version(version) => *version != existing.version,
        RequestedChange::Bump(_) => false,
    };
    if existing.mode != request.mode || version_differs {
        return Err(ReleaseError::validation(format!(
            "a different plan is already prepared ({} v{}, plan {}); pass --re-resolve to replace it",
            existing.mode,
            existing.version,
            existing.id()
        )));
    }

    info!(plan_id = %existing.id(), "reusing prepared plan");
    Ok(Some(existing))
}
