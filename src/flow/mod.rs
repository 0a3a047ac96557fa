//! Release workflow orchestration
//!
//! Each step is a plain function over a [`FlowContext`]:
//!
//! 1. [`permission_check`]: write access to the channel's target repository
//! 2. [`ci_gate`]: CI on the target's current HEAD is green
//! 3. [`prepare`]: resolve (or reuse) a plan and write its artifacts
//! 4. [`publish`]: commit, open a pull request, wait for CI, merge
//!
//! [`remove`] reverts a published release through the same pull request
//! contract. The CLI chains the steps directly; the guided wizard runs the
//! same functions one per transition.

pub mod guided;
mod merge;
mod prepare;
mod publish;
mod remove;
mod status;

pub use prepare::{prepare, PlanSource, PrepareOutcome};
pub use publish::{publish, PublishOptions, PublishOutcome};
pub use remove::{remove, RemoveOutcome};
pub use status::{status, ChannelStatus};

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::{Config, RepoConfig};
use crate::domain::{Channel, DiffClassifier, IncidentalPathClassifier, ReleasePlan};
use crate::error::{ReleaseError, Result};
use crate::git::{RepoProvider, WorkingCopy};
use crate::hooks::{HookContext, HookExecutor, HookType};
use crate::infra::ci::{CiGate, CiSettings};
use crate::infra::hosting::HostingApi;
use crate::infra::{CallPolicy, CancelFlag, TimeoutClass};
use crate::resolve::{ResolveRequest, Resolver};

/// Everything a release step needs, built once per invocation.
pub struct FlowContext {
    pub config: Config,
    pub hosting: Arc<dyn HostingApi>,
    pub repos: Arc<dyn RepoProvider>,
    pub classifier: Arc<dyn DiffClassifier>,
    pub policy: CallPolicy,
    pub ci: CiSettings,
    pub cancel: CancelFlag,
}

impl FlowContext {
    /// Build a context whose policy, CI settings and classifier come from `config`.
    pub fn new(config: Config, hosting: Arc<dyn HostingApi>, repos: Arc<dyn RepoProvider>) -> Result<Self> {
        let classifier = IncidentalPathClassifier::new(&config.smart.incidental_paths)?;
        Ok(FlowContext {
            policy: CallPolicy::from_config(&config),
            ci: CiSettings::from(&config.ci),
            classifier: Arc::new(classifier),
            cancel: CancelFlag::new(),
            config,
            hosting,
            repos,
        })
    }

    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_ci(mut self, ci: CiSettings) -> Self {
        self.ci = ci;
        self
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.config, self.repos.as_ref(), self.classifier.as_ref(), &self.policy)
    }

    fn open_target(&self, channel: Channel) -> Result<(&str, &RepoConfig, Box<dyn WorkingCopy>)> {
        let (target_id, repo) = self.config.target(channel)?;
        let working_copy = self.repos.open(target_id, repo)?;
        Ok((target_id, repo, working_copy))
    }

    /// Run a configured hook. Pre-publish failures abort; the others are only logged.
    fn run_hook(&self, hook_type: HookType, plan: &ReleasePlan, plan_path: &Path, pull_request: Option<u64>) -> Result<()> {
        let script = match hook_type {
            HookType::PrePublish => self.config.hooks.pre_publish.as_ref(),
            HookType::PostPublish => self.config.hooks.post_publish.as_ref(),
            HookType::PostRemove => self.config.hooks.post_remove.as_ref(),
        };
        let Some(script) = script else {
            return Ok(());
        };

        let context = HookContext {
            hook_type,
            channel: plan.channel,
            version: plan.version.clone(),
            plan_path: plan_path.to_path_buf(),
            pull_request,
        };
        let timeout = self.policy.timeout(TimeoutClass::Medium);
        match hook_type {
            HookType::PrePublish => HookExecutor::execute(script, &context, timeout),
            HookType::PostPublish | HookType::PostRemove => {
                HookExecutor::execute_permissive(script, &context, timeout);
                Ok(())
            }
        }
    }
}

/// Fail unless the operator can push to the channel's target repository.
#[instrument(skip(ctx))]
pub fn permission_check(ctx: &FlowContext, channel: Channel) -> Result<()> {
    let (_, repo) = ctx.config.target(channel)?;
    let permission = ctx.hosting.permission(&repo.slug)?;
    if !permission.can_write() {
        warn!(slug = %repo.slug, %permission, "write permission missing, aborting");
        return Err(ReleaseError::Permission {
            slug: repo.slug.clone(),
            permission,
        });
    }
    info!(slug = %repo.slug, %permission, "permission check passed");
    Ok(())
}

/// Wait for CI on the target repository's current HEAD.
#[instrument(skip(ctx))]
pub fn ci_gate(ctx: &FlowContext, channel: Channel) -> Result<()> {
    let (_, repo, working_copy) = ctx.open_target(channel)?;
    let head = working_copy.head_commit()?;
    CiGate::new(ctx.hosting.as_ref(), &ctx.policy, &ctx.ci).wait_for_green(&repo.slug, &head, Some(&ctx.cancel))
}

/// `release plan`: permission check, CI gate, then prepare.
pub fn plan_release(ctx: &FlowContext, request: ResolveRequest, re_resolve: bool) -> Result<PrepareOutcome> {
    let channel = request.channel;
    permission_check(ctx, channel)?;
    ci_gate(ctx, channel)?;
    prepare(ctx, PlanSource::Resolve { request, re_resolve })
}

/// `release publish`: permission check, then publish.
pub fn publish_release(ctx: &FlowContext, plan_path: &Path, options: PublishOptions) -> Result<PublishOutcome> {
    let plan = crate::infra::artifacts::read_plan(plan_path)?;
    permission_check(ctx, plan.channel)?;
    publish(ctx, plan_path, options)
}

/// `release remove`: permission check, then remove.
pub fn remove_release(ctx: &FlowContext, plan_path: &Path, options: PublishOptions) -> Result<RemoveOutcome> {
    let plan = crate::infra::artifacts::read_plan(plan_path)?;
    permission_check(ctx, plan.channel)?;
    remove(ctx, plan_path, options)
}

/// Refuse to commit on top of changes the release does not own.
pub(crate) fn ensure_no_unrelated_changes(
    ctx: &FlowContext,
    repo_id: &str,
    working_copy: &dyn WorkingCopy,
    owned: &crate::infra::artifacts::ArtifactSet,
    allow_dirty: bool,
) -> Result<()> {
    let state_dir = ctx
        .config
        .state_dir
        .strip_prefix(working_copy.path())
        .unwrap_or(&ctx.config.state_dir);
    let in_state_dir = |path: &str| !state_dir.as_os_str().is_empty() && Path::new(path).starts_with(state_dir);

    let unrelated: Vec<String> = working_copy
        .changed_paths()?
        .into_iter()
        .filter(|path| !owned.contains(path) && !in_state_dir(path))
        .collect();

    if unrelated.is_empty() {
        return Ok(());
    }
    if allow_dirty || ctx.config.publish.allow_dirty {
        warn!(repo = repo_id, paths = ?unrelated, "unrelated changes present, continuing as allowed");
        return Ok(());
    }
    Err(ReleaseError::UncommittedChanges {
        repo: repo_id.to_string(),
        paths: unrelated,
    })
}
