use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Channel, ReleasePlan, ResolutionMode, SemanticVersion, VersionBump};
use crate::error::{ReleaseError, Result};
use crate::infra::artifacts::atomic_write;
use crate::infra::hosting::PullRequestHandle;

pub const SESSIONS_DIR: &str = "sessions";

/// Wizard states, in the order a successful session visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    SelectChannel,
    SelectMode,
    CollectInputs,
    Resolve,
    ConfirmPlan,
    Execute,
    Report,
    Done,
    Failed,
    Aborted,
}

impl StepName {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepName::Done | StepName::Failed | StepName::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::SelectChannel => "select-channel",
            StepName::SelectMode => "select-mode",
            StepName::CollectInputs => "collect-inputs",
            StepName::Resolve => "resolve",
            StepName::ConfirmPlan => "confirm-plan",
            StepName::Execute => "execute",
            StepName::Report => "report",
            StepName::Done => "done",
            StepName::Failed => "failed",
            StepName::Aborted => "aborted",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-steps of `Execute`, run one per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecuteStep {
    PermissionCheck,
    CiGate,
    Prepare,
    Publish,
}

impl ExecuteStep {
    pub fn next(&self) -> Option<ExecuteStep> {
        match self {
            ExecuteStep::PermissionCheck => Some(ExecuteStep::CiGate),
            ExecuteStep::CiGate => Some(ExecuteStep::Prepare),
            ExecuteStep::Prepare => Some(ExecuteStep::Publish),
            ExecuteStep::Publish => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecuteStep::PermissionCheck => "permission-check",
            ExecuteStep::CiGate => "ci-gate",
            ExecuteStep::Prepare => "prepare",
            ExecuteStep::Publish => "publish",
        }
    }
}

impl fmt::Display for ExecuteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedInputs {
    pub channel: Option<Channel>,
    pub mode: Option<ResolutionMode>,
    pub bump: Option<VersionBump>,
    pub version: Option<SemanticVersion>,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SessionOutcome {
    Published {
        plan_id: String,
        version: SemanticVersion,
        pull_request: PullRequestHandle,
        already_published: bool,
    },
    Failed {
        message: String,
        exit_code: u8,
        #[serde(default)]
        pull_request: Option<PullRequestHandle>,
    },
    Aborted {
        reason: String,
    },
}

/// One guided release, persisted after every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSession {
    pub session_id: String,
    pub state: StepName,
    #[serde(default)]
    pub collected_inputs: CollectedInputs,
    #[serde(default)]
    pub pending_step: Option<ExecuteStep>,
    #[serde(default)]
    pub last_plan: Option<ReleasePlan>,
    #[serde(default)]
    pub plan_path: Option<PathBuf>,
    /// Message to show the operator when the current state is entered
    #[serde(default)]
    pub notice: Option<String>,
    #[serde(default)]
    pub outcome: Option<SessionOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReleaseSession {
    pub fn new(now: DateTime<Utc>) -> Self {
        ReleaseSession {
            session_id: Uuid::new_v4().to_string(),
            state: StepName::SelectChannel,
            collected_inputs: CollectedInputs::default(),
            pending_step: None,
            last_plan: None,
            plan_path: None,
            notice: None,
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn abort(&mut self, reason: impl Into<String>) {
        self.state = StepName::Aborted;
        self.pending_step = None;
        self.outcome = Some(SessionOutcome::Aborted { reason: reason.into() });
    }

    pub(crate) fn fail(&mut self, error: &ReleaseError) {
        self.state = StepName::Failed;
        self.outcome = Some(SessionOutcome::Failed {
            message: error.to_string(),
            exit_code: error.exit_code(),
            pull_request: error.pull_request().cloned(),
        });
    }
}

/// Session files under `<state_dir>/sessions/`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: &Path) -> Self {
        SessionStore {
            dir: state_dir.join(SESSIONS_DIR),
        }
    }

    fn path(&self, session_id: &str) -> Result<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(ReleaseError::validation(format!("invalid session id '{}'", session_id)));
        }
        Ok(self.dir.join(format!("{}.json", session_id)))
    }

    pub fn save(&self, session: &ReleaseSession) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(session)?;
        bytes.push(b'\n');
        atomic_write(&self.path(&session.session_id)?, &bytes)
    }

    pub fn load(&self, session_id: &str) -> Result<ReleaseSession> {
        let path = self.path(session_id)?;
        if !path.exists() {
            return Err(ReleaseError::validation(format!("no guided session '{}'", session_id)));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Every stored session, oldest first.
    pub fn list(&self) -> Result<Vec<ReleaseSession>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            sessions.push(serde_json::from_slice::<ReleaseSession>(&fs::read(&path)?)?);
        }
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }
}
