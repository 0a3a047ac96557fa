use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use release_orchestrator::config::load_config;
use release_orchestrator::domain::Channel;
use release_orchestrator::error::{ReleaseError, EXIT_NOT_READY, EXIT_OK, EXIT_VALIDATION};
use release_orchestrator::flow::guided::{abort_session, ReleaseSession, SessionOutcome, SessionStore, StepName, Wizard};
use release_orchestrator::flow::{self, FlowContext, PublishOptions};
use release_orchestrator::git::Git2Provider;
use release_orchestrator::infra::hosting::GitHubClient;
use release_orchestrator::infra::CallPolicy;
use release_orchestrator::logging;
use release_orchestrator::resolve::{RawRequest, ResolveRequest};
use release_orchestrator::view::{self, ConsolePrompter};

#[derive(Parser)]
#[command(
    name = "release",
    about = "Plan, publish and remove channel releases across repositories"
)]
struct Cli {
    #[arg(short, long, global = true, help = "Custom configuration file path")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "More diagnostics (-v, -vv, -vvv)")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a release and write its artifacts into the target repository
    Plan {
        #[arg(long, help = "content or app")]
        channel: String,

        #[arg(long, help = "explicit, strict, smart, head or carry")]
        mode: String,

        #[arg(long, help = "Exact version, explicit mode only")]
        version: Option<String>,

        #[arg(long, help = "major, minor or patch (default: patch)")]
        bump: Option<String>,

        #[arg(long, help = "Resolve again even if a plan is already prepared")]
        re_resolve: bool,
    },

    /// Publish a prepared plan through a pull request
    Publish {
        #[arg(long, help = "Path to the prepared plan.json")]
        plan: PathBuf,

        #[arg(long, help = "Allow unrelated uncommitted changes in the target")]
        allow_dirty: bool,
    },

    /// Revert the latest published release of a channel
    Remove {
        #[arg(long, help = "Path to the published plan.json")]
        plan: PathBuf,

        #[arg(long, help = "Allow unrelated uncommitted changes in the target")]
        allow_dirty: bool,
    },

    /// Interactive, resumable release wizard
    Guided {
        #[arg(long, conflicts_with_all = ["abort", "list"], help = "Resume a stored session")]
        resume: Option<String>,

        #[arg(long, conflicts_with = "list", help = "Abort a stored session")]
        abort: Option<String>,

        #[arg(long, help = "List stored sessions")]
        list: bool,
    },

    /// Show prepared plan, lock and last published release per channel
    Status {
        #[arg(long, help = "Only this channel")]
        channel: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            view::display_error(&format!("{:#}", err));
            let release_error = err.downcast_ref::<ReleaseError>();
            if let Some(pr) = release_error.and_then(ReleaseError::pull_request) {
                view::display_status(&format!(
                    "Pull request {} is still open; re-run the same command to resume",
                    pr
                ));
            }
            ExitCode::from(release_error.map_or(EXIT_VALIDATION, ReleaseError::exit_code))
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Command::Plan {
            channel,
            mode,
            version,
            bump,
            re_resolve,
        } => {
            // Request shape is checked before any configuration or repository is read.
            let request = ResolveRequest::parse(&RawRequest {
                channel,
                mode,
                version,
                bump,
            })?;
            let ctx = build_context(cli.config.as_deref())?;
            install_interrupt_handler(&ctx)?;

            view::display_status(&format!("Resolving {} release ({})...", request.channel, request.mode));
            let outcome = flow::plan_release(&ctx, request, re_resolve)?;
            print!("{}", view::render_plan(&outcome.plan));
            let verb = match (outcome.reused, outcome.files_written) {
                (_, 0) => "Plan unchanged at",
                (true, _) => "Prepared plan restored at",
                (false, _) => "Plan written to",
            };
            view::display_success(&format!("{} {}", verb, outcome.plan_path.display()));
            Ok(EXIT_OK)
        }

        Command::Publish { plan, allow_dirty } => {
            let ctx = build_context(cli.config.as_deref())?;
            install_interrupt_handler(&ctx)?;

            let outcome = flow::publish_release(&ctx, &plan, PublishOptions { allow_dirty })?;
            if outcome.already_published {
                view::display_success(&format!(
                    "{} v{} was already published via {}",
                    outcome.plan.channel, outcome.plan.version, outcome.pull_request
                ));
            } else {
                view::display_success(&format!(
                    "Published {} v{} via {}",
                    outcome.plan.channel, outcome.plan.version, outcome.pull_request
                ));
            }
            Ok(EXIT_OK)
        }

        Command::Remove { plan, allow_dirty } => {
            let ctx = build_context(cli.config.as_deref())?;
            install_interrupt_handler(&ctx)?;

            let outcome = flow::remove_release(&ctx, &plan, PublishOptions { allow_dirty })?;
            let restored = match &outcome.restored {
                Some(previous) => format!("v{} is live again", previous.version),
                None => "no earlier release remains".to_string(),
            };
            view::display_success(&format!(
                "Removed {} v{} via {}; {}",
                outcome.plan.channel, outcome.plan.version, outcome.pull_request, restored
            ));
            Ok(EXIT_OK)
        }

        Command::Guided { resume, abort, list } => {
            let config = load_config(cli.config.as_deref()).context("loading configuration")?;
            let store = SessionStore::new(&config.state_dir);

            if list {
                let sessions = store.list()?;
                if sessions.is_empty() {
                    view::display_status("No guided sessions");
                }
                for session in sessions {
                    println!("{}", view::render_session_line(&session));
                }
                return Ok(EXIT_OK);
            }

            if let Some(session_id) = abort {
                let session = abort_session(&store, &session_id, "aborted by operator")?;
                view::display_status(&view::render_outcome(&session));
                return Ok(EXIT_OK);
            }

            let ctx = context_from(config)?;
            install_interrupt_handler(&ctx)?;
            let mut prompter = ConsolePrompter::new(ctx.cancel.clone());
            let mut wizard = Wizard::new(&ctx, &mut prompter);

            let mut session = match resume {
                Some(session_id) => wizard.store().load(&session_id)?,
                None => {
                    let session = ReleaseSession::new(Utc::now());
                    wizard.store().save(&session)?;
                    view::display_status(&format!("Guided session {}", session.session_id));
                    session
                }
            };
            let session_id = session.session_id.clone();

            if session.is_terminal() {
                session = wizard.resume(&session_id)?;
            } else {
                wizard.run(&mut session).with_context(|| {
                    format!(
                        "session {} paused; resume with `release guided --resume {}`",
                        session_id, session_id
                    )
                })?;
            }
            Ok(session_exit_code(&session))
        }

        Command::Status { channel } => {
            let ctx = build_context(cli.config.as_deref())?;
            let channels = match channel {
                Some(name) => vec![name.parse::<Channel>()?],
                None => ctx.config.configured_channels(),
            };
            if channels.is_empty() {
                view::display_status("No release channels configured");
            }
            for channel in channels {
                print!("{}", view::render_status(&flow::status(&ctx, channel)?));
            }
            Ok(EXIT_OK)
        }
    }
}

fn build_context(config_path: Option<&Path>) -> Result<FlowContext> {
    let config = load_config(config_path).context("loading configuration")?;
    context_from(config)
}

fn context_from(config: release_orchestrator::config::Config) -> Result<FlowContext> {
    let token = std::env::var(&config.remote.token_env)
        .ok()
        .filter(|token| !token.trim().is_empty());
    if token.is_none() {
        tracing::warn!(env = %config.remote.token_env, "no API token set, remote calls are anonymous");
    }

    let hosting = GitHubClient::new(config.remote.api_url.clone(), token, CallPolicy::from_config(&config))
        .context("creating hosting client")?;
    Ok(FlowContext::new(config, Arc::new(hosting), Arc::new(Git2Provider))?)
}

/// First Ctrl-C cancels cooperatively; a second one exits immediately.
fn install_interrupt_handler(ctx: &FlowContext) -> Result<()> {
    let cancel = ctx.cancel.clone();
    ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        cancel.cancel();
    })
    .context("installing Ctrl-C handler")
}

fn session_exit_code(session: &ReleaseSession) -> u8 {
    match (&session.state, &session.outcome) {
        (StepName::Done, _) => EXIT_OK,
        (_, Some(SessionOutcome::Failed { exit_code, .. })) => *exit_code,
        _ => EXIT_NOT_READY,
    }
}
