//! Terminal interaction (prompts) and formatting.
//!
//! Separates concerns:
//! - `formatter` - Pure formatting functions
//! - This module - [`ConsolePrompter`], the interactive [`Prompter`] used by `release guided`
//!
//! Nothing here reads repositories or talks to the hosting service.

use std::fmt::Display;
use std::io;

use console::{style, Term};

use crate::domain::{Channel, ReleasePlan, ResolutionMode, SemanticVersion, VersionBump};
use crate::error::Result;
use crate::flow::guided::{Answer, Prompter, ReleaseSession, StepName};
use crate::infra::CancelFlag;

pub mod formatter;

pub use formatter::{
    display_error, display_status, display_success, display_warning, render_outcome, render_plan,
    render_session_line, render_status,
};

/// Reads answers from the terminal. `q` or Ctrl-C cancels any prompt.
pub struct ConsolePrompter {
    term: Term,
    cancel: CancelFlag,
}

impl ConsolePrompter {
    pub fn new(cancel: CancelFlag) -> Self {
        ConsolePrompter {
            term: Term::stderr(),
            cancel,
        }
    }

    /// Read one trimmed line, or `None` if the operator cancelled.
    fn ask(&self, prompt: &str) -> Result<Option<String>> {
        self.term.write_str(prompt)?;
        let line = match self.term.read_line() {
            Ok(line) => line,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let line = line.trim().to_string();
        if line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Numbered selection, defaulting to the first option on Enter.
    fn choose<T, F>(&self, title: &str, options: &[T], describe: F) -> Result<Answer<T>>
    where
        T: Copy + Display,
        F: Fn(&T) -> String,
    {
        if options.len() == 1 {
            return Ok(Answer::Value(options[0]));
        }

        self.term.write_line("")?;
        self.term.write_line(&style(title).bold().to_string())?;
        for (i, option) in options.iter().enumerate() {
            self.term.write_line(&format!("  {}. {:<12} {}", i + 1, option, describe(option)))?;
        }

        loop {
            let prompt = format!("Select (1-{}) [default: 1, q to quit]: ", options.len());
            let Some(selection) = self.ask(&prompt)? else {
                return Ok(Answer::Cancel);
            };
            let index = if selection.is_empty() {
                1
            } else {
                selection.parse::<usize>().unwrap_or(0)
            };
            if index > 0 && index <= options.len() {
                return Ok(Answer::Value(options[index - 1]));
            }
            self.term.write_line(&format!("Invalid selection '{}'", selection))?;
        }
    }
}

impl Prompter for ConsolePrompter {
    fn choose_channel(&mut self, channels: &[Channel]) -> Result<Answer<Channel>> {
        self.choose("Release channel:", channels, |_| String::new())
    }

    fn choose_mode(&mut self) -> Result<Answer<ResolutionMode>> {
        self.choose("Resolution mode:", &ResolutionMode::ALL, |m| m.describe().to_string())
    }

    fn ask_bump(&mut self) -> Result<Answer<VersionBump>> {
        let defaulted: Vec<VersionBump> = std::iter::once(VersionBump::default())
            .chain(VersionBump::ALL.into_iter().filter(|b| *b != VersionBump::default()))
            .collect();
        self.choose("Version bump:", &defaulted, |_| String::new())
    }

    fn ask_version(&mut self, last_published: Option<&SemanticVersion>) -> Result<Answer<String>> {
        let hint = match last_published {
            Some(version) => format!(" (last published {})", version),
            None => " (nothing published yet)".to_string(),
        };
        match self.ask(&format!("\nVersion to release{}: ", hint))? {
            Some(text) => Ok(Answer::Value(text)),
            None => Ok(Answer::Cancel),
        }
    }

    fn confirm_plan(&mut self, plan: &ReleasePlan) -> Result<Answer<bool>> {
        self.term.write_line("")?;
        self.term.write_str(&render_plan(plan))?;
        match self.ask("\nPublish this plan? (y/N, q to quit): ")? {
            Some(response) => {
                let response = response.to_lowercase();
                Ok(Answer::Value(response == "y" || response == "yes"))
            }
            None => Ok(Answer::Cancel),
        }
    }

    fn show_notice(&mut self, message: &str) {
        display_warning(message);
    }

    fn show_outcome(&mut self, session: &ReleaseSession) {
        let message = render_outcome(session);
        match session.state {
            StepName::Done => display_success(&message),
            StepName::Failed => display_error(&message),
            _ => display_status(&message),
        }
    }
}
