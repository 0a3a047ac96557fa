//! Pure release planning: turns a request plus observed repository state
//! into a [`ReleasePlan`] or a [`BlockedError`]. Performs no I/O.

use crate::domain::classifier::{DiffClass, DiffClassifier};
use crate::domain::plan::{ArtifactRecord, Channel, ReleasePlan, RequestedChange, ResolutionMode};
use crate::domain::readiness::{BlockingReason, RepoReadiness};
use crate::domain::version::SemanticVersion;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// One repository that prevented a plan from being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoBlock {
    pub repo_id: String,
    pub reason: BlockingReason,
}

impl fmt::Display for RepoBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.repo_id, self.reason)
    }
}

/// Why a resolution produced no plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockedError {
    #[error("version-not-greater: {requested} is not greater than published {published}")]
    VersionNotGreater {
        requested: SemanticVersion,
        published: SemanticVersion,
    },

    #[error("{}", render_blocks(.0))]
    Repos(Vec<RepoBlock>),
}

fn render_blocks(blocks: &[RepoBlock]) -> String {
    blocks.iter().map(|b| b.to_string()).collect::<Vec<_>>().join("; ")
}

impl BlockedError {
    /// Short machine-friendly reason, e.g. `hal-sdl: dirty working copy`.
    pub fn reason(&self) -> String {
        match self {
            BlockedError::VersionNotGreater { .. } => "version-not-greater".to_string(),
            BlockedError::Repos(blocks) => render_blocks(blocks),
        }
    }

    pub fn repo_ids(&self) -> Vec<&str> {
        match self {
            BlockedError::VersionNotGreater { .. } => Vec::new(),
            BlockedError::Repos(blocks) => blocks.iter().map(|b| b.repo_id.as_str()).collect(),
        }
    }
}

/// Everything the planner needs, gathered by the caller.
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub channel: Channel,
    pub mode: ResolutionMode,
    pub change: RequestedChange,
    pub last_published: Option<&'a SemanticVersion>,
    /// Most recent published plan of the channel, consulted by `auto-carry`
    pub last_plan: Option<&'a ReleasePlan>,
    pub readiness: &'a [RepoReadiness],
    pub artifacts: &'a [ArtifactRecord],
    pub created_at: DateTime<Utc>,
}

/// Produce a release plan or explain why none can be produced.
pub fn plan(request: &PlanRequest<'_>, classifier: &dyn DiffClassifier) -> Result<ReleasePlan, BlockedError> {
    match request.mode {
        ResolutionMode::Explicit => {}
        ResolutionMode::AutoStrict => check_readiness(request.readiness, |_, _| true)?,
        ResolutionMode::AutoSmart => check_readiness(request.readiness, |repo, reason| {
            classifier.classify(repo, reason) == DiffClass::Substantive
        })?,
        ResolutionMode::AutoHead => {
            check_readiness(request.readiness, |_, reason| reason.is_read_failure())?
        }
        ResolutionMode::AutoCarry => {
            if let Some(last) = request.last_plan.filter(|last| !refs_moved(last, request.readiness)) {
                return Ok(carry_forward(last, request.readiness));
            }
            check_readiness(request.readiness, |_, _| true)?;
        }
    }

    let version = target_version(request)?;
    Ok(ReleasePlan {
        channel: request.channel,
        version,
        mode: request.mode,
        source_refs: collect_refs(request.readiness),
        diagnostics: request.readiness.to_vec(),
        artifacts: request.artifacts.to_vec(),
        created_at: request.created_at,
    })
}

fn check_readiness<F>(readiness: &[RepoReadiness], blocks: F) -> Result<(), BlockedError>
where
    F: Fn(&str, &BlockingReason) -> bool,
{
    let blocked: Vec<RepoBlock> = readiness
        .iter()
        .filter_map(|r| {
            r.blocking_reason
                .as_ref()
                .filter(|reason| blocks(&r.repo_id, reason))
                .map(|reason| RepoBlock {
                    repo_id: r.repo_id.clone(),
                    reason: reason.clone(),
                })
        })
        .collect();

    if blocked.is_empty() {
        Ok(())
    } else {
        Err(BlockedError::Repos(blocked))
    }
}

fn target_version(request: &PlanRequest<'_>) -> Result<SemanticVersion, BlockedError> {
    let base = request.last_published.cloned().unwrap_or_else(SemanticVersion::zero);
    let version = request.change.apply(&base);

    if let Some(published) = request.last_published {
        if version <= *published {
            return Err(BlockedError::VersionNotGreater {
                requested: version,
                published: published.clone(),
            });
        }
    }
    Ok(version)
}

fn collect_refs(readiness: &[RepoReadiness]) -> BTreeMap<String, String> {
    readiness
        .iter()
        .filter_map(|r| r.resolved_ref.as_ref().map(|c| (r.repo_id.clone(), c.clone())))
        .collect()
}

/// A repository that cannot be read counts as moved.
fn refs_moved(last: &ReleasePlan, readiness: &[RepoReadiness]) -> bool {
    readiness.iter().any(|r| match &r.resolved_ref {
        Some(commit) => last.source_refs.get(&r.repo_id) != Some(commit),
        None => true,
    })
}

fn carry_forward(last: &ReleasePlan, readiness: &[RepoReadiness]) -> ReleasePlan {
    ReleasePlan {
        mode: ResolutionMode::AutoCarry,
        diagnostics: readiness.to_vec(),
        ..last.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::classifier::IncidentalPathClassifier;
    use crate::domain::version::VersionBump;
    use chrono::TimeZone;

    fn ready(repo: &str, commit: &str) -> RepoReadiness {
        RepoReadiness::observe(repo, commit, Some("main"), "main", vec![])
    }

    fn dirty(repo: &str, commit: &str, paths: &[&str]) -> RepoReadiness {
        RepoReadiness::observe(
            repo,
            commit,
            Some("main"),
            "main",
            paths.iter().map(|p| p.to_string()).collect(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    fn request<'a>(
        mode: ResolutionMode,
        change: RequestedChange,
        last: Option<&'a SemanticVersion>,
        readiness: &'a [RepoReadiness],
    ) -> PlanRequest<'a> {
        PlanRequest {
            channel: Channel::App,
            mode,
            change,
            last_published: last,
            last_plan: None,
            readiness,
            artifacts: &[],
            created_at: now(),
        }
    }

    fn classifier() -> IncidentalPathClassifier {
        IncidentalPathClassifier::with_defaults().unwrap()
    }

    #[test]
    fn test_strict_minor_bump_on_clean_repos() {
        let last = SemanticVersion::new(1, 4, 2);
        let readiness = vec![ready("engine", "aaa"), ready("hal-sdl", "bbb")];
        let req = request(
            ResolutionMode::AutoStrict,
            RequestedChange::Bump(VersionBump::Minor),
            Some(&last),
            &readiness,
        );
        let plan = plan(&req, &classifier()).unwrap();
        assert_eq!(plan.version, SemanticVersion::new(1, 5, 0));
        assert_eq!(plan.source_refs.len(), 2);
        assert_eq!(plan.source_refs["hal-sdl"], "bbb");
        assert_eq!(plan.created_at, now());
    }

    #[test]
    fn test_strict_blocks_on_dirty_repo() {
        let last = SemanticVersion::new(1, 4, 2);
        let readiness = vec![ready("engine", "aaa"), dirty("hal-sdl", "bbb", &["src/x.c"])];
        let req = request(
            ResolutionMode::AutoStrict,
            RequestedChange::Bump(VersionBump::Minor),
            Some(&last),
            &readiness,
        );
        let err = plan(&req, &classifier()).unwrap_err();
        assert_eq!(err.reason(), "hal-sdl: dirty working copy");
        assert_eq!(err.repo_ids(), vec!["hal-sdl"]);
    }

    #[test]
    fn test_smart_allows_incidental_dirt() {
        let last = SemanticVersion::new(1, 4, 2);
        let readiness = vec![dirty("engine", "aaa", &["build/out.o"])];
        let req = request(
            ResolutionMode::AutoSmart,
            RequestedChange::Bump(VersionBump::Patch),
            Some(&last),
            &readiness,
        );
        let plan = plan(&req, &classifier()).unwrap();
        assert_eq!(plan.version, SemanticVersion::new(1, 4, 3));
        assert_eq!(plan.warnings().count(), 1);
    }

    #[test]
    fn test_smart_blocks_on_substantive_dirt() {
        let readiness = vec![dirty("engine", "aaa", &["build/out.o", "src/main.c"])];
        let req = request(
            ResolutionMode::AutoSmart,
            RequestedChange::Bump(VersionBump::Patch),
            None,
            &readiness,
        );
        assert!(matches!(plan(&req, &classifier()), Err(BlockedError::Repos(_))));
    }

    #[test]
    fn test_head_ignores_dirt_and_drift() {
        let readiness = vec![
            dirty("engine", "aaa", &["src/main.c"]),
            RepoReadiness::observe("hal-sdl", "bbb", Some("feature"), "main", vec![]),
        ];
        let req = request(
            ResolutionMode::AutoHead,
            RequestedChange::Bump(VersionBump::Patch),
            None,
            &readiness,
        );
        let plan = plan(&req, &classifier()).unwrap();
        assert_eq!(plan.source_refs["engine"], "aaa");
        assert_eq!(plan.source_refs["hal-sdl"], "bbb");
    }

    #[test]
    fn test_head_blocks_on_read_failure() {
        let readiness = vec![ready("engine", "aaa"), RepoReadiness::read_failed("assets", "missing")];
        let req = request(
            ResolutionMode::AutoHead,
            RequestedChange::Bump(VersionBump::Patch),
            None,
            &readiness,
        );
        let err = plan(&req, &classifier()).unwrap_err();
        assert_eq!(err.repo_ids(), vec!["assets"]);
    }

    #[test]
    fn test_explicit_must_exceed_last_published() {
        let last = SemanticVersion::new(1, 4, 2);
        let readiness = vec![ready("engine", "aaa")];
        let req = request(
            ResolutionMode::Explicit,
            RequestedChange::Version(SemanticVersion::new(1, 4, 2)),
            Some(&last),
            &readiness,
        );
        let err = plan(&req, &classifier()).unwrap_err();
        assert_eq!(err.reason(), "version-not-greater");
    }

    #[test]
    fn test_explicit_ignores_readiness() {
        let last = SemanticVersion::new(1, 4, 2);
        let readiness = vec![dirty("engine", "aaa", &["src/main.c"])];
        let req = request(
            ResolutionMode::Explicit,
            RequestedChange::Version(SemanticVersion::new(2, 0, 0)),
            Some(&last),
            &readiness,
        );
        let plan = plan(&req, &classifier()).unwrap();
        assert_eq!(plan.version, SemanticVersion::new(2, 0, 0));
        assert_eq!(plan.diagnostics.len(), 1);
    }

    #[test]
    fn test_explicit_without_history_accepts_any_version() {
        let req = request(
            ResolutionMode::Explicit,
            RequestedChange::Version(SemanticVersion::new(0, 0, 1)),
            None,
            &[],
        );
        assert_eq!(plan(&req, &classifier()).unwrap().version, SemanticVersion::new(0, 0, 1));
    }

    #[test]
    fn test_auto_without_history_bumps_from_zero() {
        let readiness = vec![ready("engine", "aaa")];
        let req = request(
            ResolutionMode::AutoStrict,
            RequestedChange::Bump(VersionBump::Minor),
            None,
            &readiness,
        );
        assert_eq!(plan(&req, &classifier()).unwrap().version, SemanticVersion::new(0, 1, 0));
    }

    #[test]
    fn test_pre_release_not_greater_than_its_release() {
        let last = SemanticVersion::new(1, 0, 0);
        let req = request(
            ResolutionMode::Explicit,
            RequestedChange::Version(SemanticVersion::parse("1.0.0-rc.2").unwrap()),
            Some(&last),
            &[],
        );
        assert!(matches!(
            plan(&req, &classifier()),
            Err(BlockedError::VersionNotGreater { .. })
        ));
    }

    fn published_plan() -> ReleasePlan {
        let readiness = vec![ready("engine", "aaa"), ready("hal-sdl", "bbb")];
        let req = request(
            ResolutionMode::AutoStrict,
            RequestedChange::Bump(VersionBump::Minor),
            None,
            &readiness,
        );
        plan(&req, &classifier()).unwrap()
    }

    #[test]
    fn test_carry_reuses_last_plan_when_nothing_moved() {
        let last = published_plan();
        let readiness = vec![ready("engine", "aaa"), ready("hal-sdl", "bbb")];
        let mut req = request(
            ResolutionMode::AutoCarry,
            RequestedChange::Bump(VersionBump::Patch),
            Some(&last.version),
            &readiness,
        );
        req.last_plan = Some(&last);
        req.created_at = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        let carried = plan(&req, &classifier()).unwrap();
        assert_eq!(carried.version, last.version);
        assert_eq!(carried.source_refs, last.source_refs);
        assert_eq!(carried.created_at, last.created_at);
        assert_eq!(carried.mode, ResolutionMode::AutoCarry);
        assert_eq!(carried.id(), last.id());
    }

    #[test]
    fn test_carry_falls_back_to_strict_when_refs_moved() {
        let last = published_plan();
        let readiness = vec![ready("engine", "ccc"), ready("hal-sdl", "bbb")];
        let mut req = request(
            ResolutionMode::AutoCarry,
            RequestedChange::Bump(VersionBump::Patch),
            Some(&last.version),
            &readiness,
        );
        req.last_plan = Some(&last);

        let next = plan(&req, &classifier()).unwrap();
        assert_eq!(next.version, SemanticVersion::new(0, 1, 1));
        assert_eq!(next.source_refs["engine"], "ccc");
        assert_eq!(next.mode, ResolutionMode::AutoCarry);
    }

    #[test]
    fn test_carry_fallback_blocks_like_strict() {
        let last = published_plan();
        let readiness = vec![dirty("engine", "ccc", &["build/x.o"])];
        let mut req = request(
            ResolutionMode::AutoCarry,
            RequestedChange::Bump(VersionBump::Patch),
            Some(&last.version),
            &readiness,
        );
        req.last_plan = Some(&last);
        assert!(plan(&req, &classifier()).is_err());
    }

    #[test]
    fn test_read_failure_never_has_a_pinned_ref() {
        let readiness = vec![ready("engine", "aaa"), RepoReadiness::read_failed("assets", "gone")];
        let req = request(
            ResolutionMode::Explicit,
            RequestedChange::Version(SemanticVersion::new(3, 0, 0)),
            None,
            &readiness,
        );
        let plan = plan(&req, &classifier()).unwrap();
        assert!(!plan.source_refs.contains_key("assets"));
        assert_eq!(plan.diagnostics.len(), 2);
    }
}
