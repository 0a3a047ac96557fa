use crate::domain::readiness::RepoReadiness;
use crate::domain::version::{SemanticVersion, VersionBump};
use crate::error::{ReleaseError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A release stream with its own version history and target repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Content,
    App,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Content, Channel::App];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Content => "content",
            Channel::App => "app",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "content" => Ok(Channel::Content),
            "app" => Ok(Channel::App),
            other => Err(ReleaseError::validation(format!(
                "unknown channel '{}' (expected content or app)",
                other
            ))),
        }
    }
}

/// How the target version is derived and which readiness problems block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMode {
    /// Operator-supplied version, readiness is informational only
    Explicit,
    /// Bump, any readiness problem blocks
    AutoStrict,
    /// Bump, only substantive readiness problems block
    AutoSmart,
    /// Bump at current HEADs, only unreadable repositories block
    AutoHead,
    /// Reuse the last published plan when no dependency moved
    AutoCarry,
}

impl ResolutionMode {
    pub const ALL: [ResolutionMode; 5] = [
        ResolutionMode::Explicit,
        ResolutionMode::AutoStrict,
        ResolutionMode::AutoSmart,
        ResolutionMode::AutoHead,
        ResolutionMode::AutoCarry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMode::Explicit => "explicit",
            ResolutionMode::AutoStrict => "auto-strict",
            ResolutionMode::AutoSmart => "auto-smart",
            ResolutionMode::AutoHead => "auto-head",
            ResolutionMode::AutoCarry => "auto-carry",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ResolutionMode::Explicit => "use an exact version, readiness is informational",
            ResolutionMode::AutoStrict => "bump; any dirty or drifted repository blocks",
            ResolutionMode::AutoSmart => "bump; only substantive changes block",
            ResolutionMode::AutoHead => "bump at current HEADs; only unreadable repositories block",
            ResolutionMode::AutoCarry => "reuse the last published plan if nothing moved",
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, ResolutionMode::Explicit)
    }
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionMode {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explicit" => Ok(ResolutionMode::Explicit),
            "strict" | "auto-strict" => Ok(ResolutionMode::AutoStrict),
            "smart" | "auto-smart" => Ok(ResolutionMode::AutoSmart),
            "head" | "auto-head" => Ok(ResolutionMode::AutoHead),
            "carry" | "auto-carry" => Ok(ResolutionMode::AutoCarry),
            other => Err(ReleaseError::validation(format!(
                "unknown mode '{}' (expected explicit, strict, smart, head or carry)",
                other
            ))),
        }
    }
}

/// The version change an operator asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedChange {
    Bump(VersionBump),
    Version(SemanticVersion),
}

impl RequestedChange {
    /// Version this change produces on top of `base`.
    pub fn apply(&self, base: &SemanticVersion) -> SemanticVersion {
        match self {
            RequestedChange::Bump(bump) => base.bump(*bump),
            RequestedChange::Version(version) => version.clone(),
        }
    }
}

impl fmt::Display for RequestedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedChange::Bump(bump) => write!(f, "{} bump", bump),
            RequestedChange::Version(version) => write!(f, "version {}", version),
        }
    }
}

/// A build output recorded in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: String,
    pub size: u64,
    pub sha256: String,
}

/// Content-derived identity of a plan.
///
/// Covers channel, version and pinned refs only, so two resolutions of the
/// same release produce the same id regardless of when they ran.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(String);

impl PlanId {
    pub fn from_contents(contents: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(contents);
        PlanId(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the short ID (first 12 characters)
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

/// The resolved description of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePlan {
    pub channel: Channel,
    pub version: SemanticVersion,
    pub mode: ResolutionMode,
    /// Dependency repository id to pinned commit id
    pub source_refs: BTreeMap<String, String>,
    pub diagnostics: Vec<RepoReadiness>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRecord>,
    pub created_at: DateTime<Utc>,
}

impl ReleasePlan {
    pub fn id(&self) -> PlanId {
        let mut contents = format!("{}\n{}\n", self.channel, self.version);
        for (repo, commit) in &self.source_refs {
            contents.push_str(repo);
            contents.push('=');
            contents.push_str(commit);
            contents.push('\n');
        }
        PlanId::from_contents(contents.as_bytes())
    }

    /// Branch that carries the release commit on the target repository.
    ///
    /// `round` counts earlier publications of this plan that were removed.
    /// Each round gets its own branch so a merged pull request from an
    /// earlier round is never mistaken for this one.
    pub fn release_branch(&self, round: usize) -> String {
        self.branch_name("release", round)
    }

    /// Branch that carries the reverting commit on the target repository.
    pub fn revert_branch(&self, round: usize) -> String {
        self.branch_name("revert", round)
    }

    fn branch_name(&self, kind: &str, round: usize) -> String {
        let name = format!("{}/{}-v{}-{}", kind, self.channel, self.version, self.id().short());
        match round {
            0 => name,
            n => format!("{}-r{}", name, n),
        }
    }

    pub fn release_title(&self) -> String {
        format!("release({}): v{}", self.channel, self.version)
    }

    pub fn revert_title(&self) -> String {
        format!("revert({}): v{}", self.channel, self.version)
    }

    /// Diagnostics that reported a problem, whether or not the mode blocked on it.
    pub fn warnings(&self) -> impl Iterator<Item = &RepoReadiness> {
        self.diagnostics.iter().filter(|d| d.blocking_reason.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan() -> ReleasePlan {
        let mut refs = BTreeMap::new();
        refs.insert("engine".to_string(), "aaa111".to_string());
        refs.insert("hal-sdl".to_string(), "bbb222".to_string());
        ReleasePlan {
            channel: Channel::App,
            version: SemanticVersion::new(1, 5, 0),
            mode: ResolutionMode::AutoStrict,
            source_refs: refs,
            diagnostics: vec![],
            artifacts: vec![],
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!("APP".parse::<Channel>().unwrap(), Channel::App);
        assert_eq!("content".parse::<Channel>().unwrap(), Channel::Content);
        assert!("firmware".parse::<Channel>().is_err());
    }

    #[test]
    fn test_mode_parse_accepts_short_and_long_names() {
        assert_eq!("strict".parse::<ResolutionMode>().unwrap(), ResolutionMode::AutoStrict);
        assert_eq!("auto-carry".parse::<ResolutionMode>().unwrap(), ResolutionMode::AutoCarry);
        assert!("lenient".parse::<ResolutionMode>().is_err());
    }

    #[test]
    fn test_plan_id_ignores_timestamp_and_mode() {
        let a = plan();
        let mut b = plan();
        b.created_at = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        b.mode = ResolutionMode::AutoCarry;
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().short().len(), 12);
        assert_eq!(a.id().as_str().len(), 64);
    }

    #[test]
    fn test_plan_id_changes_with_refs() {
        let a = plan();
        let mut b = plan();
        b.source_refs.insert("engine".to_string(), "ccc333".to_string());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_branch_and_title_names() {
        let p = plan();
        let short = p.id().short().to_string();
        assert_eq!(p.release_branch(0), format!("release/app-v1.5.0-{}", short));
        assert_eq!(p.revert_branch(0), format!("revert/app-v1.5.0-{}", short));
        assert_eq!(p.release_branch(2), format!("release/app-v1.5.0-{}-r2", short));
        assert_eq!(p.release_title(), "release(app): v1.5.0");
    }

    #[test]
    fn test_plan_json_uses_readable_names() {
        let json = serde_json::to_value(plan()).unwrap();
        assert_eq!(json["channel"], "app");
        assert_eq!(json["mode"], "auto-strict");
        assert_eq!(json["version"], "1.5.0");
        assert_eq!(json["source_refs"]["engine"], "aaa111");
    }

    #[test]
    fn test_plan_without_artifacts_field_loads() {
        let mut json = serde_json::to_value(plan()).unwrap();
        json.as_object_mut().unwrap().remove("artifacts");
        let loaded: ReleasePlan = serde_json::from_value(json).unwrap();
        assert!(loaded.artifacts.is_empty());
    }
}
