//! Turns an operator request into a release plan.
//!
//! The request is validated before anything is read. Readiness of every
//! dependency repository is then gathered on a bounded worker pool, the
//! ledger and build outputs are read, and the pure planner decides.

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, RepoConfig};
use crate::domain::planner::{self, PlanRequest};
use crate::domain::{
    Channel, DiffClassifier, ReleasePlan, RepoReadiness, RequestedChange, ResolutionMode, SemanticVersion,
    VersionBump,
};
use crate::error::{ReleaseError, Result};
use crate::git::RepoProvider;
use crate::infra::artifacts::scan_build_outputs;
use crate::infra::ledger::PublishedLedger;
use crate::infra::policy::{CallPolicy, TimeoutClass};

/// Operator input exactly as typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRequest {
    pub channel: String,
    pub mode: String,
    pub version: Option<String>,
    pub bump: Option<String>,
}

/// A request whose shape has been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveRequest {
    pub channel: Channel,
    pub mode: ResolutionMode,
    pub change: RequestedChange,
}

impl ResolveRequest {
    /// Build a request from typed parts, enforcing the mode/change pairing.
    pub fn new(channel: Channel, mode: ResolutionMode, change: RequestedChange) -> Result<Self> {
        match (&mode, &change) {
            (ResolutionMode::Explicit, RequestedChange::Version(_)) => {}
            (ResolutionMode::Explicit, RequestedChange::Bump(_)) => {
                return Err(ReleaseError::validation("explicit mode requires a version"))
            }
            (_, RequestedChange::Version(_)) => {
                return Err(ReleaseError::validation(format!(
                    "mode '{}' computes the version itself; use --bump instead of --version",
                    mode
                )))
            }
            (_, RequestedChange::Bump(_)) => {}
        }
        Ok(ResolveRequest { channel, mode, change })
    }

    /// Validate raw operator input. No I/O happens here.
    pub fn parse(raw: &RawRequest) -> Result<Self> {
        let channel: Channel = raw.channel.trim().parse()?;
        let mode: ResolutionMode = raw.mode.trim().parse()?;

        let change = if mode.is_explicit() {
            if raw.bump.is_some() {
                return Err(ReleaseError::validation("explicit mode takes --version, not --bump"));
            }
            match raw.version.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => RequestedChange::Version(SemanticVersion::parse(v)?),
                _ => return Err(ReleaseError::validation("explicit mode requires a version")),
            }
        } else {
            if raw.version.is_some() {
                return Err(ReleaseError::validation(format!(
                    "mode '{}' computes the version itself; use --bump instead of --version",
                    mode
                )));
            }
            let bump = match raw.bump.as_deref() {
                Some(b) => b.trim().parse()?,
                None => VersionBump::default(),
            };
            RequestedChange::Bump(bump)
        };

        ResolveRequest::new(channel, mode, change)
    }
}

/// Reads the state of the world and asks the planner for a plan.
pub struct Resolver<'a> {
    config: &'a Config,
    repos: &'a dyn RepoProvider,
    classifier: &'a dyn DiffClassifier,
    policy: &'a CallPolicy,
}

impl<'a> Resolver<'a> {
    pub fn new(
        config: &'a Config,
        repos: &'a dyn RepoProvider,
        classifier: &'a dyn DiffClassifier,
        policy: &'a CallPolicy,
    ) -> Self {
        Resolver {
            config,
            repos,
            classifier,
            policy,
        }
    }

    #[instrument(skip(self), fields(channel = %request.channel, mode = %request.mode))]
    pub fn resolve(&self, request: &ResolveRequest) -> Result<ReleasePlan> {
        let channel_config = self.config.channel(request.channel)?;
        let dependencies = self.config.dependencies(request.channel)?;

        let readiness = self.gather_readiness(&dependencies)?;
        for r in readiness.iter().filter(|r| !r.is_ready()) {
            if let Some(reason) = &r.blocking_reason {
                debug!(repo = %r.repo_id, %reason, "repository not ready");
            }
        }

        let ledger = PublishedLedger::load(&self.config.state_dir, request.channel)?;
        let last_published = ledger.last_published();

        let artifacts = match &channel_config.artifacts_dir {
            Some(dir) => scan_build_outputs(dir)?,
            None => Vec::new(),
        };

        let plan_request = PlanRequest {
            channel: request.channel,
            mode: request.mode,
            change: request.change.clone(),
            last_published: last_published.map(|r| &r.plan.version),
            last_plan: last_published.map(|r| &r.plan),
            readiness: &readiness,
            artifacts: &artifacts,
            created_at: Utc::now(),
        };

        let plan = planner::plan(&plan_request, self.classifier)?;
        info!(version = %plan.version, plan_id = %plan.id(), "plan resolved");
        Ok(plan)
    }

    /// Read every repository concurrently, keeping declaration order.
    fn gather_readiness(&self, dependencies: &[(&str, &RepoConfig)]) -> Result<Vec<RepoReadiness>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.resolve.workers)
            .build()
            .map_err(|e| ReleaseError::config(format!("cannot start resolve workers: {}", e)))?;

        Ok(pool.install(|| {
            dependencies
                .par_iter()
                .map(|(id, repo)| self.read_repo(id, repo))
                .collect()
        }))
    }

    fn read_repo(&self, repo_id: &str, repo: &RepoConfig) -> RepoReadiness {
        let observed = self.policy.read(TimeoutClass::Short, "read repository state", |_| {
            let working_copy = self.repos.open(repo_id, repo)?;
            let head = working_copy.head_commit()?;
            let branch = working_copy.current_branch()?;
            let changed = working_copy.changed_paths()?;
            Ok(RepoReadiness::observe(
                repo_id,
                head,
                branch.as_deref(),
                &repo.branch,
                changed,
            ))
        });

        observed.unwrap_or_else(|e| {
            warn!(repo = repo_id, error = %e, "cannot read repository");
            RepoReadiness::read_failed(repo_id, e.to_string())
        })
    }
}
