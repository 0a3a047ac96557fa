//! Local record of what each channel has published.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BlockedError, Channel, PlanId, ReleasePlan, SemanticVersion};
use crate::error::Result;
use crate::infra::artifacts::atomic_write;
use crate::infra::hosting::PullRequestHandle;

pub const LEDGER_FILE: &str = "published.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRelease {
    pub plan: ReleasePlan,
    pub pull_request: PullRequestHandle,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub removed: Option<Removal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Removal {
    pub pull_request: PullRequestHandle,
    pub removed_at: DateTime<Utc>,
}

impl PublishedRelease {
    pub fn is_live(&self) -> bool {
        self.removed.is_none()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    releases: Vec<PublishedRelease>,
}

/// Published releases of one channel, oldest first.
#[derive(Debug)]
pub struct PublishedLedger {
    path: PathBuf,
    releases: Vec<PublishedRelease>,
}

impl PublishedLedger {
    pub fn path_for(state_dir: &Path, channel: Channel) -> PathBuf {
        state_dir.join(channel.as_str()).join(LEDGER_FILE)
    }

    /// Load the ledger, starting empty when the channel never published.
    pub fn load(state_dir: &Path, channel: Channel) -> Result<Self> {
        let path = Self::path_for(state_dir, channel);
        let releases = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<LedgerFile>(&bytes)?.releases,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(PublishedLedger { path, releases })
    }

    pub fn save(&self) -> Result<()> {
        let file = LedgerFile {
            releases: self.releases.clone(),
        };
        let mut bytes = serde_json::to_vec_pretty(&file)?;
        bytes.push(b'\n');
        atomic_write(&self.path, &bytes)
    }

    pub fn releases(&self) -> &[PublishedRelease] {
        &self.releases
    }

    /// Most recent release that has not been removed.
    pub fn last_published(&self) -> Option<&PublishedRelease> {
        self.releases.iter().rev().find(|r| r.is_live())
    }

    pub fn last_version(&self) -> Option<&SemanticVersion> {
        self.last_published().map(|r| &r.plan.version)
    }

    /// Live release with the given plan id.
    pub fn find(&self, id: &PlanId) -> Option<&PublishedRelease> {
        self.releases.iter().rev().find(|r| r.is_live() && &r.plan.id() == id)
    }

    /// Live release published before the one with `id`.
    pub fn previous(&self, id: &PlanId) -> Option<&PublishedRelease> {
        let position = self
            .releases
            .iter()
            .rposition(|r| r.is_live() && &r.plan.id() == id)?;
        self.releases[..position].iter().rev().find(|r| r.is_live())
    }

    /// A plan may move the channel forward or restate its latest live release.
    pub fn ensure_advances(&self, plan: &ReleasePlan) -> std::result::Result<(), BlockedError> {
        match self.last_published() {
            Some(last) if plan.version <= last.plan.version && last.plan.id() != plan.id() => {
                Err(BlockedError::VersionNotGreater {
                    requested: plan.version.clone(),
                    published: last.plan.version.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Removed publications of the plan with `id`.
    pub fn removed_count(&self, id: &PlanId) -> usize {
        self.releases
            .iter()
            .filter(|r| !r.is_live() && &r.plan.id() == id)
            .count()
    }

    pub fn record_published(&mut self, plan: ReleasePlan, pull_request: PullRequestHandle, at: DateTime<Utc>) {
        self.releases.push(PublishedRelease {
            plan,
            pull_request,
            published_at: at,
            removed: None,
        });
    }

    /// Mark the live release with `id` removed. Returns false if none matched.
    pub fn mark_removed(&mut self, id: &PlanId, pull_request: PullRequestHandle, at: DateTime<Utc>) -> bool {
        match self
            .releases
            .iter_mut()
            .rev()
            .find(|r| r.is_live() && &r.plan.id() == id)
        {
            Some(release) => {
                release.removed = Some(Removal {
                    pull_request,
                    removed_at: at,
                });
                true
            }
            None => false,
        }
    }
}
