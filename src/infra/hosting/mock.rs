use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{CiStatus, HostingApi, MergeMethod, NewPullRequest, Permission, PrStatus, PullRequestHandle};
use crate::error::{ReleaseError, Result};

/// Scripted merge response for [`MockHosting`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Conflict,
    Rejected(String),
}

#[derive(Default)]
struct MockState {
    permissions: HashMap<String, Permission>,
    ci: HashMap<String, VecDeque<CiStatus>>,
    pull_requests: Vec<PullRequestHandle>,
    merge_outcomes: VecDeque<MergeOutcome>,
    fail_create: Option<String>,
    calls: Vec<String>,
    next_number: u64,
}

/// In-memory hosting service for tests
///
/// CI answers are consumed in order per ref and the last one repeats.
/// Unknown repositories report write permission and unknown refs report
/// success, so tests only script what they assert on.
#[derive(Default)]
pub struct MockHosting {
    state: Mutex<MockState>,
}

impl MockHosting {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_permission(self, slug: &str, permission: Permission) -> Self {
        self.state().permissions.insert(slug.to_string(), permission);
        self
    }

    /// Queue CI answers for a ref, or for every ref with `"*"`.
    pub fn with_ci(self, git_ref: &str, statuses: &[CiStatus]) -> Self {
        self.state()
            .ci
            .insert(git_ref.to_string(), statuses.iter().copied().collect());
        self
    }

    pub fn with_merge_outcomes(self, outcomes: &[MergeOutcome]) -> Self {
        self.state().merge_outcomes = outcomes.iter().cloned().collect();
        self
    }

    pub fn with_pull_request(self, handle: PullRequestHandle) -> Self {
        {
            let mut state = self.state();
            state.next_number = state.next_number.max(handle.number);
            state.pull_requests.push(handle);
        }
        self
    }

    pub fn fail_create(self, message: &str) -> Self {
        self.state().fail_create = Some(message.to_string());
        self
    }

    /// Every call made so far, e.g. `create_pull_request acme/app release/app-v1.0.0`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state().calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn pull_requests(&self) -> Vec<PullRequestHandle> {
        self.state().pull_requests.clone()
    }
}

impl HostingApi for MockHosting {
    fn permission(&self, slug: &str) -> Result<Permission> {
        let mut state = self.state();
        state.calls.push(format!("permission {}", slug));
        Ok(state.permissions.get(slug).copied().unwrap_or(Permission::Write))
    }

    fn ci_status(&self, slug: &str, git_ref: &str) -> Result<CiStatus> {
        let mut state = self.state();
        state.calls.push(format!("ci_status {} {}", slug, git_ref));
        let key = if state.ci.contains_key(git_ref) { git_ref } else { "*" };
        let status = match state.ci.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(CiStatus::Success),
            Some(queue) => queue.front().copied().unwrap_or(CiStatus::Success),
            None => CiStatus::Success,
        };
        Ok(status)
    }

    fn pull_request(&self, slug: &str, number: u64) -> Result<PullRequestHandle> {
        let mut state = self.state();
        state.calls.push(format!("pull_request {} {}", slug, number));
        state
            .pull_requests
            .iter()
            .find(|pr| pr.repo_slug == slug && pr.number == number)
            .cloned()
            .ok_or_else(|| ReleaseError::remote("read pull request", Some(404), "Not Found"))
    }

    fn find_pull_request(&self, slug: &str, head: &str, base: &str) -> Result<Option<PullRequestHandle>> {
        let mut state = self.state();
        state.calls.push(format!("find_pull_request {} {}", slug, head));
        Ok(state
            .pull_requests
            .iter()
            .rev()
            .find(|pr| pr.repo_slug == slug && pr.head_branch == head && pr.base_branch == base)
            .cloned())
    }

    fn create_pull_request(&self, slug: &str, request: &NewPullRequest) -> Result<PullRequestHandle> {
        let mut state = self.state();
        state.calls.push(format!("create_pull_request {} {}", slug, request.head));
        if let Some(message) = &state.fail_create {
            return Err(ReleaseError::remote("create pull request", Some(422), message.clone()));
        }
        state.next_number += 1;
        let handle = PullRequestHandle {
            repo_slug: slug.to_string(),
            number: state.next_number,
            head_branch: request.head.clone(),
            base_branch: request.base.clone(),
            status: PrStatus::Open,
            head_sha: Some(format!("{}-head", request.head)),
            url: None,
        };
        state.pull_requests.push(handle.clone());
        Ok(handle)
    }

    fn merge_pull_request(&self, slug: &str, number: u64, method: MergeMethod) -> Result<String> {
        let mut state = self.state();
        state
            .calls
            .push(format!("merge_pull_request {} {} {}", slug, number, method.as_str()));
        let outcome = state.merge_outcomes.pop_front().unwrap_or(MergeOutcome::Merged);
        match outcome {
            MergeOutcome::Merged => {
                let pr = state
                    .pull_requests
                    .iter_mut()
                    .find(|pr| pr.repo_slug == slug && pr.number == number)
                    .ok_or_else(|| ReleaseError::remote("merge pull request", Some(404), "Not Found"))?;
                pr.status = PrStatus::Merged;
                Ok(format!("merge-{}", number))
            }
            MergeOutcome::Conflict => Err(ReleaseError::MergeConflict {
                slug: slug.to_string(),
                number,
                message: "Base branch was modified".to_string(),
            }),
            MergeOutcome::Rejected(message) => Err(ReleaseError::remote("merge pull request", Some(422), message)),
        }
    }

    fn update_pull_request_branch(&self, slug: &str, number: u64) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("update_pull_request_branch {} {}", slug, number));
        if let Some(pr) = state
            .pull_requests
            .iter_mut()
            .find(|pr| pr.repo_slug == slug && pr.number == number)
        {
            pr.head_sha = Some(format!("{}-updated", pr.head_branch));
        }
        Ok(())
    }
}
