use std::collections::VecDeque;

use crate::domain::{Channel, ReleasePlan, ResolutionMode, SemanticVersion, VersionBump};
use crate::error::{ReleaseError, Result};

use super::ReleaseSession;

/// An operator's reply to one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer<T> {
    Value(T),
    Cancel,
}

/// What the wizard needs from whoever is at the keyboard.
///
/// Implementations only present and collect; they never touch the session.
pub trait Prompter {
    fn choose_channel(&mut self, channels: &[Channel]) -> Result<Answer<Channel>>;

    fn choose_mode(&mut self) -> Result<Answer<ResolutionMode>>;

    fn ask_bump(&mut self) -> Result<Answer<VersionBump>>;

    /// Free-form version text; the wizard validates it.
    fn ask_version(&mut self, last_published: Option<&SemanticVersion>) -> Result<Answer<String>>;

    /// The only confirmation before anything is changed.
    fn confirm_plan(&mut self, plan: &ReleasePlan) -> Result<Answer<bool>>;

    fn show_notice(&mut self, message: &str);

    fn show_outcome(&mut self, session: &ReleaseSession);
}

/// A reply queued on a [`ScriptedPrompter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Channel(Channel),
    Mode(ResolutionMode),
    Bump(VersionBump),
    Version(String),
    Confirm(bool),
    Cancel,
}

/// Prompter that replays queued replies, for tests and non-interactive runs.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    replies: VecDeque<Scripted>,
    pub notices: Vec<String>,
    pub outcomes: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new(replies: impl IntoIterator<Item = Scripted>) -> Self {
        ScriptedPrompter {
            replies: replies.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }

    fn next<T>(&mut self, prompt: &str, pick: impl FnOnce(Scripted) -> Option<T>) -> Result<Answer<T>> {
        match self.replies.pop_front() {
            Some(Scripted::Cancel) => Ok(Answer::Cancel),
            Some(reply) => {
                let shown = format!("{:?}", reply);
                pick(reply).map(Answer::Value).ok_or_else(|| {
                    ReleaseError::validation(format!("scripted reply {} does not answer {}", shown, prompt))
                })
            }
            None => Err(ReleaseError::validation(format!("no scripted reply left for {}", prompt))),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn choose_channel(&mut self, _channels: &[Channel]) -> Result<Answer<Channel>> {
        self.next("channel", |r| match r {
            Scripted::Channel(c) => Some(c),
            _ => None,
        })
    }

    fn choose_mode(&mut self) -> Result<Answer<ResolutionMode>> {
        self.next("mode", |r| match r {
            Scripted::Mode(m) => Some(m),
            _ => None,
        })
    }

    fn ask_bump(&mut self) -> Result<Answer<VersionBump>> {
        self.next("bump", |r| match r {
            Scripted::Bump(b) => Some(b),
            _ => None,
        })
    }

    fn ask_version(&mut self, _last_published: Option<&SemanticVersion>) -> Result<Answer<String>> {
        self.next("version", |r| match r {
            Scripted::Version(v) => Some(v),
            _ => None,
        })
    }

    fn confirm_plan(&mut self, _plan: &ReleasePlan) -> Result<Answer<bool>> {
        self.next("confirmation", |r| match r {
            Scripted::Confirm(yes) => Some(yes),
            _ => None,
        })
    }

    fn show_notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }

    fn show_outcome(&mut self, session: &ReleaseSession) {
        self.outcomes.push(session.state.to_string());
    }
}
