//! Guided release wizard
//!
//! A finite state machine over an explicit [`ReleaseSession`] value:
//!
//! ```text
//! SelectChannel -> SelectMode -> CollectInputs -> Resolve -> ConfirmPlan
//!     -> Execute (permission-check, ci-gate, prepare, publish) -> Report -> Done
//! ```
//!
//! Every transition performs at most one resolve or flow call and persists
//! the session before returning. A session interrupted by a transient
//! failure stays in its state and re-issues the same call when resumed.
//! Terminal sessions (`Done`, `Failed`, `Aborted`) replay their stored
//! outcome without side effects.

mod prompt;
mod session;

pub use prompt::{Answer, Prompter, Scripted, ScriptedPrompter};
pub use session::{
    CollectedInputs, ExecuteStep, ReleaseSession, SessionOutcome, SessionStore, StepName, SESSIONS_DIR,
};

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::{ci_gate, permission_check, prepare, publish, FlowContext, PlanSource, PublishOptions};
use crate::domain::{RequestedChange, SemanticVersion};
use crate::error::{ReleaseError, Result};
use crate::infra::ledger::PublishedLedger;
use crate::resolve::ResolveRequest;

pub struct Wizard<'a> {
    ctx: &'a FlowContext,
    store: SessionStore,
    prompter: &'a mut dyn Prompter,
}

impl<'a> Wizard<'a> {
    pub fn new(ctx: &'a FlowContext, prompter: &'a mut dyn Prompter) -> Self {
        Wizard {
            store: SessionStore::new(&ctx.config.state_dir),
            ctx,
            prompter,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Start a new session and drive it to a terminal state.
    pub fn start(&mut self) -> Result<ReleaseSession> {
        let mut session = ReleaseSession::new(Utc::now());
        self.store.save(&session)?;
        info!(session = %session.session_id, "guided session started");
        self.run(&mut session)?;
        Ok(session)
    }

    /// Continue a stored session where it stopped.
    pub fn resume(&mut self, session_id: &str) -> Result<ReleaseSession> {
        let mut session = self.store.load(session_id)?;
        if session.is_terminal() {
            self.prompter.show_outcome(&session);
            return Ok(session);
        }
        info!(session = %session.session_id, state = %session.state, "resuming guided session");
        self.run(&mut session)?;
        Ok(session)
    }

    /// Step until the session is terminal. Resumable failures return early
    /// with the session saved in its current state.
    pub fn run(&mut self, session: &mut ReleaseSession) -> Result<()> {
        while !session.is_terminal() {
            self.step(session)?;
        }
        if session.state != StepName::Done {
            self.prompter.show_outcome(session);
        }
        Ok(())
    }

    /// Perform exactly one transition and persist the result.
    #[instrument(skip_all, fields(session = %session.session_id, state = %session.state))]
    pub fn step(&mut self, session: &mut ReleaseSession) -> Result<()> {
        if session.is_terminal() {
            return Ok(());
        }
        if let Some(notice) = session.notice.take() {
            self.prompter.show_notice(&notice);
        }

        let result = self.transition(session);
        session.updated_at = Utc::now();
        match result {
            Ok(()) => {
                self.store.save(session)?;
                Ok(())
            }
            Err(e) if e.is_resumable() => {
                warn!(error = %e, "step interrupted, session kept for resume");
                self.store.save(session)?;
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "session failed");
                session.fail(&e);
                self.store.save(session)
            }
        }
    }

    fn transition(&mut self, session: &mut ReleaseSession) -> Result<()> {
        match session.state {
            StepName::SelectChannel => {
                let channels = self.ctx.config.configured_channels();
                if channels.is_empty() {
                    return Err(ReleaseError::config("no release channels are configured"));
                }
                match self.prompter.choose_channel(&channels)? {
                    Answer::Value(channel) => {
                        self.ctx.config.channel(channel)?;
                        session.collected_inputs.channel = Some(channel);
                        session.state = StepName::SelectMode;
                    }
                    Answer::Cancel => session.abort("cancelled at channel selection"),
                }
            }
            StepName::SelectMode => match self.prompter.choose_mode()? {
                Answer::Value(mode) => {
                    session.collected_inputs.mode = Some(mode);
                    session.state = StepName::CollectInputs;
                }
                Answer::Cancel => session.abort("cancelled at mode selection"),
            },
            StepName::CollectInputs => self.collect_inputs(session)?,
            StepName::Resolve => self.resolve(session)?,
            StepName::ConfirmPlan => {
                let plan = session
                    .last_plan
                    .as_ref()
                    .ok_or_else(|| ReleaseError::validation("session has no plan to confirm"))?;
                match self.prompter.confirm_plan(plan)? {
                    Answer::Value(true) => {
                        session.pending_step = Some(ExecuteStep::PermissionCheck);
                        session.state = StepName::Execute;
                    }
                    Answer::Value(false) => {
                        info!("plan declined, collecting inputs again");
                        session.last_plan = None;
                        session.state = StepName::CollectInputs;
                    }
                    Answer::Cancel => session.abort("cancelled at plan confirmation"),
                }
            }
            StepName::Execute => self.execute(session)?,
            StepName::Report => {
                session.state = StepName::Done;
                self.prompter.show_outcome(session);
            }
            StepName::Done | StepName::Failed | StepName::Aborted => {}
        }
        Ok(())
    }

    fn collect_inputs(&mut self, session: &mut ReleaseSession) -> Result<()> {
        let channel = required(session.collected_inputs.channel, "channel")?;
        let mode = required(session.collected_inputs.mode, "mode")?;

        if mode.is_explicit() {
            let ledger = PublishedLedger::load(&self.ctx.config.state_dir, channel)?;
            match self.prompter.ask_version(ledger.last_version())? {
                Answer::Value(text) => match SemanticVersion::parse(&text) {
                    Ok(version) => {
                        session.collected_inputs.version = Some(version);
                        session.collected_inputs.bump = None;
                        session.state = StepName::Resolve;
                    }
                    Err(e) => session.notice = Some(e.to_string()),
                },
                Answer::Cancel => session.abort("cancelled while collecting inputs"),
            }
        } else {
            match self.prompter.ask_bump()? {
                Answer::Value(bump) => {
                    session.collected_inputs.bump = Some(bump);
                    session.collected_inputs.version = None;
                    session.state = StepName::Resolve;
                }
                Answer::Cancel => session.abort("cancelled while collecting inputs"),
            }
        }
        Ok(())
    }

    fn resolve(&mut self, session: &mut ReleaseSession) -> Result<()> {
        let inputs = &session.collected_inputs;
        let channel = required(inputs.channel, "channel")?;
        let mode = required(inputs.mode, "mode")?;
        let change = match &inputs.version {
            Some(version) if mode.is_explicit() => RequestedChange::Version(version.clone()),
            _ => RequestedChange::Bump(inputs.bump.unwrap_or_default()),
        };

        let resolved = ResolveRequest::new(channel, mode, change).and_then(|r| self.ctx.resolver().resolve(&r));
        match resolved {
            Ok(plan) => {
                session.last_plan = Some(plan);
                session.state = StepName::ConfirmPlan;
            }
            Err(e @ ReleaseError::Blocked(_)) => {
                info!(error = %e, "resolution blocked, choosing the mode again");
                session.notice = Some(e.to_string());
                session.state = StepName::SelectMode;
            }
            Err(e @ ReleaseError::Validation(_)) => {
                session.notice = Some(e.to_string());
                session.state = StepName::CollectInputs;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn execute(&mut self, session: &mut ReleaseSession) -> Result<()> {
        let plan = session
            .last_plan
            .clone()
            .ok_or_else(|| ReleaseError::validation("session has no confirmed plan"))?;
        let step = session.pending_step.unwrap_or(ExecuteStep::PermissionCheck);
        info!(step = %step, "executing");

        let result = match step {
            ExecuteStep::PermissionCheck => permission_check(self.ctx, plan.channel),
            ExecuteStep::CiGate => ci_gate(self.ctx, plan.channel),
            ExecuteStep::Prepare => prepare(self.ctx, PlanSource::Resolved(plan.clone())).map(|outcome| {
                session.plan_path = Some(outcome.plan_path);
            }),
            ExecuteStep::Publish => {
                let plan_path = session
                    .plan_path
                    .clone()
                    .ok_or_else(|| ReleaseError::validation("session has no prepared plan"))?;
                publish(self.ctx, &plan_path, PublishOptions::default()).map(|outcome| {
                    session.outcome = Some(SessionOutcome::Published {
                        plan_id: outcome.plan.id().as_str().to_string(),
                        version: outcome.plan.version.clone(),
                        pull_request: outcome.pull_request,
                        already_published: outcome.already_published,
                    });
                })
            }
        };

        match result {
            Ok(()) => {
                match step.next() {
                    Some(next) => session.pending_step = Some(next),
                    None => {
                        session.pending_step = None;
                        session.state = StepName::Report;
                    }
                }
                Ok(())
            }
            Err(ReleaseError::Cancelled(reason)) => {
                session.abort(reason);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Abort a stored session from outside the wizard. Terminal sessions are left as they are.
pub fn abort_session(store: &SessionStore, session_id: &str, reason: &str) -> Result<ReleaseSession> {
    let mut session = store.load(session_id)?;
    if !session.is_terminal() {
        session.abort(reason);
        session.updated_at = Utc::now();
        store.save(&session)?;
        info!(session = session_id, "guided session aborted");
    }
    Ok(session)
}

fn required<T: Copy>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| ReleaseError::validation(format!("session is missing its {}", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, Config, RepoConfig};
    use crate::domain::{Channel, ResolutionMode, VersionBump};
    use crate::git::{MockRepoProvider, MockWorkingCopy};
    use crate::infra::hosting::{CiStatus, MockHosting, Permission};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        ctx: FlowContext,
        hosting: Arc<MockHosting>,
    }

    fn fixture(hosting: MockHosting, engine: MockWorkingCopy) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = Config {
            state_dir: dir.path().join("state"),
            ..Config::default()
        };
        config.repos.insert(
            "engine".to_string(),
            RepoConfig {
                path: dir.path().join("engine"),
                slug: "acme/engine".to_string(),
                branch: "main".to_string(),
            },
        );
        config.repos.insert(
            "app".to_string(),
            RepoConfig {
                path: dir.path().join("app"),
                slug: "acme/app".to_string(),
                branch: "main".to_string(),
            },
        );
        config.channels.app = Some(ChannelConfig {
            target: "app".to_string(),
            dependencies: vec!["engine".to_string()],
            artifacts_dir: None,
        });

        let repos = MockRepoProvider::new()
            .with_repo("engine", engine)
            .with_repo("app", MockWorkingCopy::new(dir.path().join("app"), "app-head", "main"));
        let hosting = Arc::new(hosting);
        let ctx = FlowContext::new(config, hosting.clone(), Arc::new(repos)).unwrap();
        Fixture { _dir: dir, ctx, hosting }
    }

    fn engine(dir_hint: &str) -> MockWorkingCopy {
        MockWorkingCopy::new(dir_hint, "e1", "main")
    }

    #[test]
    fn test_happy_path_reaches_done() {
        let fx = fixture(MockHosting::new(), engine("/tmp/engine"));
        let mut prompter = ScriptedPrompter::new([
            Scripted::Channel(Channel::App),
            Scripted::Mode(ResolutionMode::AutoStrict),
            Scripted::Bump(VersionBump::Minor),
            Scripted::Confirm(true),
        ]);
        let session = Wizard::new(&fx.ctx, &mut prompter).start().unwrap();

        assert_eq!(session.state, StepName::Done);
        match &session.outcome {
            Some(SessionOutcome::Published { version, .. }) => assert_eq!(*version, SemanticVersion::new(0, 1, 0)),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(fx.hosting.count_calls("merge_pull_request"), 1);
        assert_eq!(prompter.outcomes, vec!["done".to_string()]);
    }

    #[test]
    fn test_blocked_resolution_returns_to_mode_selection() {
        let fx = fixture(
            MockHosting::new(),
            engine("/tmp/engine").with_changes(&["src/hal_sdl.c"]),
        );
        let mut prompter = ScriptedPrompter::new([
            Scripted::Channel(Channel::App),
            Scripted::Mode(ResolutionMode::AutoStrict),
            Scripted::Bump(VersionBump::Patch),
            Scripted::Cancel,
        ]);
        let session = Wizard::new(&fx.ctx, &mut prompter).start().unwrap();

        assert_eq!(session.state, StepName::Aborted);
        assert_eq!(prompter.notices.len(), 1);
        assert!(prompter.notices[0].contains("engine: dirty working copy"), "got: {:?}", prompter.notices);
        assert_eq!(fx.hosting.count_calls("create_pull_request"), 0);
    }

    #[test]
    fn test_invalid_version_is_asked_again() {
        let fx = fixture(MockHosting::new(), engine("/tmp/engine"));
        let mut prompter = ScriptedPrompter::new([
            Scripted::Channel(Channel::App),
            Scripted::Mode(ResolutionMode::Explicit),
            Scripted::Version("one.two".to_string()),
            Scripted::Version("2.0.0".to_string()),
            Scripted::Confirm(false),
            Scripted::Cancel,
        ]);
        let session = Wizard::new(&fx.ctx, &mut prompter).start().unwrap();

        assert_eq!(session.state, StepName::Aborted);
        assert_eq!(session.collected_inputs.version, Some(SemanticVersion::new(2, 0, 0)));
        assert_eq!(prompter.notices.len(), 1);
        assert_eq!(prompter.remaining(), 0);
    }

    #[test]
    fn test_denied_permission_fails_session() {
        let fx = fixture(
            MockHosting::new().with_permission("acme/app", Permission::Read),
            engine("/tmp/engine"),
        );
        let mut prompter = ScriptedPrompter::new([
            Scripted::Channel(Channel::App),
            Scripted::Mode(ResolutionMode::AutoHead),
            Scripted::Bump(VersionBump::Patch),
            Scripted::Confirm(true),
        ]);
        let session = Wizard::new(&fx.ctx, &mut prompter).start().unwrap();

        assert_eq!(session.state, StepName::Failed);
        match &session.outcome {
            Some(SessionOutcome::Failed { exit_code, .. }) => assert_eq!(*exit_code, 4),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(prompter.outcomes, vec!["failed".to_string()]);
    }

    #[test]
    fn test_cancel_during_ci_gate_aborts() {
        let fx = fixture(
            MockHosting::new().with_ci("app-head", &[CiStatus::Pending]),
            engine("/tmp/engine"),
        );
        fx.ctx.cancel.cancel();
        let mut prompter = ScriptedPrompter::new([
            Scripted::Channel(Channel::App),
            Scripted::Mode(ResolutionMode::AutoStrict),
            Scripted::Bump(VersionBump::Patch),
            Scripted::Confirm(true),
        ]);
        let session = Wizard::new(&fx.ctx, &mut prompter).start().unwrap();

        assert_eq!(session.state, StepName::Aborted);
        assert_eq!(fx.hosting.count_calls("create_pull_request"), 0);
        assert!(matches!(
            crate::infra::lock::ReleaseLock::inspect(&fx.ctx.config.state_dir, Channel::App),
            Ok(crate::infra::lock::LockState::Free)
        ));
    }

    #[test]
    fn test_abort_session_leaves_terminal_sessions_alone() {
        let fx = fixture(MockHosting::new(), engine("/tmp/engine"));
        let store = SessionStore::new(&fx.ctx.config.state_dir);
        let session = ReleaseSession::new(Utc::now());
        store.save(&session).unwrap();

        let aborted = abort_session(&store, &session.session_id, "operator request").unwrap();
        assert_eq!(aborted.state, StepName::Aborted);
        let again = abort_session(&store, &session.session_id, "second request").unwrap();
        assert_eq!(again.outcome, aborted.outcome);
    }
}
