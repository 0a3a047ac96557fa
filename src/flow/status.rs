use crate::domain::{Channel, ReleasePlan};
use crate::error::Result;
use crate::infra::artifacts::ArtifactSet;
use crate::infra::ledger::{PublishedLedger, PublishedRelease};
use crate::infra::lock::{LockState, ReleaseLock};

use super::FlowContext;

/// Read-only snapshot of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStatus {
    pub channel: Channel,
    pub prepared: Option<ReleasePlan>,
    /// Whether the prepared plan is the one already published
    pub prepared_is_published: bool,
    pub lock: LockState,
    pub last_published: Option<PublishedRelease>,
}

/// Inspect a channel without taking its lock.
pub fn status(ctx: &FlowContext, channel: Channel) -> Result<ChannelStatus> {
    let (_, repo) = ctx.config.target(channel)?;
    let prepared = ArtifactSet::new(&repo.path, &ctx.config.release_dir, channel).existing_plan()?;
    let ledger = PublishedLedger::load(&ctx.config.state_dir, channel)?;
    let prepared_is_published = prepared
        .as_ref()
        .is_some_and(|plan| ledger.find(&plan.id()).is_some());

    Ok(ChannelStatus {
        channel,
        prepared,
        prepared_is_published,
        lock: ReleaseLock::inspect(&ctx.config.state_dir, channel)?,
        last_published: ledger.last_published().cloned(),
    })
}
