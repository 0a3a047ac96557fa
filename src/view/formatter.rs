//! Pure formatting functions for terminal output.
//!
//! `render_*` functions build strings and are tested directly;
//! `display_*` functions print them.

use std::fmt::Write as _;

use console::style;

use crate::domain::ReleasePlan;
use crate::flow::guided::{ReleaseSession, SessionOutcome};
use crate::flow::ChannelStatus;
use crate::infra::lock::LockState;

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Format and print a warning in yellow.
pub fn display_warning(message: &str) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Summary of a plan: version, mode, pinned sources and readiness warnings.
pub fn render_plan(plan: &ReleasePlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} v{}",
        style("Release plan:").bold(),
        plan.channel,
        style(&plan.version).green()
    );
    let _ = writeln!(out, "  Mode:    {} ({})", plan.mode, plan.mode.describe());
    let _ = writeln!(out, "  Plan id: {}", plan.id().short());

    if !plan.source_refs.is_empty() {
        let _ = writeln!(out, "  Sources:");
        for (repo, commit) in &plan.source_refs {
            let _ = writeln!(out, "    {:<16} {}", repo, short_commit(commit));
        }
    }

    for diagnostic in plan.warnings() {
        if let Some(reason) = &diagnostic.blocking_reason {
            let _ = writeln!(out, "  {} {}: {}", style("⚠").yellow(), diagnostic.repo_id, reason);
        }
    }

    if !plan.artifacts.is_empty() {
        let _ = writeln!(out, "  Artifacts: {}", plan.artifacts.len());
    }
    out
}

/// Channel overview for `release status`.
pub fn render_status(status: &ChannelStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style(format!("Channel {}", status.channel)).bold());

    match &status.prepared {
        Some(plan) if status.prepared_is_published => {
            let _ = writeln!(out, "  Prepared:  v{} ({}, published)", plan.version, plan.id().short());
        }
        Some(plan) => {
            let _ = writeln!(out, "  Prepared:  v{} ({}, not published)", plan.version, plan.id().short());
        }
        None => {
            let _ = writeln!(out, "  Prepared:  none");
        }
    }

    match &status.last_published {
        Some(release) => {
            let _ = writeln!(
                out,
                "  Published: v{} via {}#{} on {}",
                release.plan.version,
                release.pull_request.repo_slug,
                release.pull_request.number,
                release.published_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        None => {
            let _ = writeln!(out, "  Published: nothing yet");
        }
    }

    let lock = match &status.lock {
        LockState::Free => "free".to_string(),
        LockState::Held(owner) => format!("held by {}", owner),
        LockState::Stale(owner) => format!("stale, left by {}", owner),
    };
    let _ = writeln!(out, "  Lock:      {}", lock);
    out
}

/// One line per stored session for `release guided --list`.
pub fn render_session_line(session: &ReleaseSession) -> String {
    let channel = session
        .collected_inputs
        .channel
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{}  {:<14} {:<8} {}",
        session.session_id,
        session.state,
        channel,
        session.updated_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(step) = session.pending_step {
        let _ = write!(line, "  (next: {})", step);
    }
    line
}

/// How a session ended, or where it stopped.
pub fn render_outcome(session: &ReleaseSession) -> String {
    match &session.outcome {
        Some(SessionOutcome::Published {
            version,
            pull_request,
            already_published: true,
            ..
        }) => format!("v{} was already published via {}", version, pull_request),
        Some(SessionOutcome::Published {
            version, pull_request, ..
        }) => format!("Published v{} via {}", version, pull_request),
        Some(SessionOutcome::Failed {
            message, pull_request, ..
        }) => match pull_request {
            Some(pr) => format!("Failed: {} (pull request {} left open)", message, pr),
            None => format!("Failed: {}", message),
        },
        Some(SessionOutcome::Aborted { reason }) => format!("Aborted: {}", reason),
        None => format!(
            "Session {} stopped at {}; resume with `release guided --resume {}`",
            session.session_id, session.state, session.session_id
        ),
    }
}

fn short_commit(commit: &str) -> &str {
    commit.get(..12).unwrap_or(commit)
}
