//! GitHub REST implementation of [`HostingApi`].

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{CiStatus, HostingApi, MergeMethod, NewPullRequest, Permission, PrStatus, PullRequestHandle};
use crate::error::{ReleaseError, Result};
use crate::infra::policy::{CallPolicy, TimeoutClass};

const MEDIA_TYPE: &str = "application/vnd.github+json";

pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: Option<String>,
    policy: CallPolicy,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: Option<String>, policy: CallPolicy) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("release-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReleaseError::config(format!("cannot build HTTP client: {}", e)))?;
        Ok(GitHubClient {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            policy,
        })
    }

    fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.api_url, path))
            .timeout(timeout)
            .header(ACCEPT, MEDIA_TYPE);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn get_json<T: DeserializeOwned>(&self, operation: &str, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.policy.read(TimeoutClass::Medium, operation, |timeout| {
            let response = self
                .request(Method::GET, path, timeout)
                .query(query)
                .send()
                .map_err(|e| transport_error(operation, e))?;
            decode(operation, check_status(operation, response)?)
        })
    }

    fn send_json<B: Serialize>(&self, operation: &str, method: Method, path: &str, body: &B) -> Result<Response> {
        self.policy.write(TimeoutClass::Medium, operation, |timeout| {
            let response = self
                .request(method, path, timeout)
                .json(body)
                .send()
                .map_err(|e| transport_error(operation, e))?;
            Ok(response)
        })
    }
}

fn transport_error(operation: &str, err: reqwest::Error) -> ReleaseError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ReleaseError::transient(operation, err.to_string())
    } else {
        ReleaseError::remote(operation, None, err.to_string())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.to_string()
            } else {
                trimmed.to_string()
            }
        })
}

/// A 405 on merge also covers missing reviews and required checks; only a
/// stale or conflicting head can be fixed by updating the branch.
fn is_out_of_date(message: &str) -> bool {
    let message = message.to_lowercase();
    ["conflict", "out of date", "out-of-date", "behind", "was modified"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Server-side failures and rate limiting are transient, other non-2xx codes are final.
fn check_status(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = error_message(status, &body);
    debug!(operation, status = status.as_u16(), %message, "remote returned error");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(ReleaseError::transient(operation, format!("HTTP {}: {}", status.as_u16(), message)))
    } else {
        Err(ReleaseError::remote(operation, Some(status.as_u16()), message))
    }
}

fn decode<T: DeserializeOwned>(operation: &str, response: Response) -> Result<T> {
    response
        .json::<T>()
        .map_err(|e| ReleaseError::remote(operation, None, format!("unexpected response: {}", e)))
}

#[derive(Deserialize)]
struct RepoResponse {
    #[serde(default)]
    permissions: Option<PermissionsResponse>,
}

#[derive(Deserialize, Default)]
struct PermissionsResponse {
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    maintain: bool,
    #[serde(default)]
    push: bool,
    #[serde(default)]
    pull: bool,
}

impl From<PermissionsResponse> for Permission {
    fn from(p: PermissionsResponse) -> Self {
        if p.admin {
            Permission::Admin
        } else if p.maintain || p.push {
            Permission::Write
        } else if p.pull {
            Permission::Read
        } else {
            Permission::None
        }
    }
}

#[derive(Deserialize)]
struct CombinedStatusResponse {
    state: String,
    total_count: u64,
}

#[derive(Deserialize)]
struct CheckRunsResponse {
    total_count: u64,
    #[serde(default)]
    check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct CheckRun {
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
}

impl CheckRun {
    fn verdict(&self) -> CiStatus {
        if self.status != "completed" {
            return CiStatus::Pending;
        }
        match self.conclusion.as_deref() {
            Some("success") | Some("neutral") | Some("skipped") => CiStatus::Success,
            _ => CiStatus::Failure,
        }
    }
}

/// Fold commit statuses and check runs into one verdict: any failure wins,
/// then any pending, then success. No reports at all is `Absent`.
fn combine_ci(statuses: &CombinedStatusResponse, checks: &CheckRunsResponse) -> CiStatus {
    let mut verdicts = Vec::new();
    if statuses.total_count > 0 {
        verdicts.push(match statuses.state.as_str() {
            "success" => CiStatus::Success,
            "pending" => CiStatus::Pending,
            _ => CiStatus::Failure,
        });
    }
    if checks.total_count > 0 {
        verdicts.extend(checks.check_runs.iter().map(CheckRun::verdict));
    }

    if verdicts.is_empty() {
        CiStatus::Absent
    } else if verdicts.contains(&CiStatus::Failure) {
        CiStatus::Failure
    } else if verdicts.contains(&CiStatus::Pending) {
        CiStatus::Pending
    } else {
        CiStatus::Success
    }
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    state: String,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    head: RefResponse,
    base: RefResponse,
}

#[derive(Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    name: String,
    sha: String,
}

impl PullResponse {
    fn into_handle(self, slug: &str) -> PullRequestHandle {
        let merged = self.merged.unwrap_or(false) || self.merged_at.is_some();
        let status = if merged {
            PrStatus::Merged
        } else if self.state == "open" {
            PrStatus::Open
        } else {
            PrStatus::Closed
        };
        PullRequestHandle {
            repo_slug: slug.to_string(),
            number: self.number,
            head_branch: self.head.name,
            base_branch: self.base.name,
            status,
            head_sha: Some(self.head.sha),
            url: self.html_url,
        }
    }
}

#[derive(Serialize)]
struct CreatePullBody<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Serialize)]
struct MergeBody<'a> {
    merge_method: &'a str,
}

#[derive(Deserialize)]
struct MergeResponse {
    sha: String,
}

impl HostingApi for GitHubClient {
    #[instrument(skip(self))]
    fn permission(&self, slug: &str) -> Result<Permission> {
        let repo: RepoResponse = self.get_json("read repository permission", &format!("/repos/{}", slug), &[])?;
        Ok(repo.permissions.map(Permission::from).unwrap_or(Permission::None))
    }

    #[instrument(skip(self))]
    fn ci_status(&self, slug: &str, git_ref: &str) -> Result<CiStatus> {
        let statuses: CombinedStatusResponse = self.get_json(
            "read commit status",
            &format!("/repos/{}/commits/{}/status", slug, git_ref),
            &[],
        )?;
        let checks: CheckRunsResponse = self.get_json(
            "read check runs",
            &format!("/repos/{}/commits/{}/check-runs", slug, git_ref),
            &[],
        )?;
        Ok(combine_ci(&statuses, &checks))
    }

    #[instrument(skip(self))]
    fn pull_request(&self, slug: &str, number: u64) -> Result<PullRequestHandle> {
        let pr: PullResponse = self.get_json("read pull request", &format!("/repos/{}/pulls/{}", slug, number), &[])?;
        Ok(pr.into_handle(slug))
    }

    #[instrument(skip(self))]
    fn find_pull_request(&self, slug: &str, head: &str, base: &str) -> Result<Option<PullRequestHandle>> {
        let owner = slug.split('/').next().unwrap_or(slug);
        let qualified_head = format!("{}:{}", owner, head);
        let pulls: Vec<PullResponse> = self.get_json(
            "list pull requests",
            &format!("/repos/{}/pulls", slug),
            &[("state", "all"), ("head", qualified_head.as_str()), ("base", base)],
        )?;
        Ok(pulls.into_iter().next().map(|pr| pr.into_handle(slug)))
    }

    #[instrument(skip(self, request), fields(head = %request.head))]
    fn create_pull_request(&self, slug: &str, request: &NewPullRequest) -> Result<PullRequestHandle> {
        let operation = "create pull request";
        let body = CreatePullBody {
            title: &request.title,
            body: &request.body,
            head: &request.head,
            base: &request.base,
        };
        let response = self.send_json(operation, Method::POST, &format!("/repos/{}/pulls", slug), &body)?;
        let pr: PullResponse = decode(operation, check_status(operation, response)?)?;
        Ok(pr.into_handle(slug))
    }

    #[instrument(skip(self))]
    fn merge_pull_request(&self, slug: &str, number: u64, method: MergeMethod) -> Result<String> {
        let operation = "merge pull request";
        let body = MergeBody {
            merge_method: method.as_str(),
        };
        let response = self.send_json(
            operation,
            Method::PUT,
            &format!("/repos/{}/pulls/{}/merge", slug, number),
            &body,
        )?;

        let status = response.status();
        if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::CONFLICT {
            let message = error_message(status, &response.text().unwrap_or_default());
            if status == StatusCode::CONFLICT || is_out_of_date(&message) {
                return Err(ReleaseError::MergeConflict {
                    slug: slug.to_string(),
                    number,
                    message,
                });
            }
            return Err(ReleaseError::remote(operation, Some(status.as_u16()), message));
        }
        let merged: MergeResponse = decode(operation, check_status(operation, response)?)?;
        Ok(merged.sha)
    }

    #[instrument(skip(self))]
    fn update_pull_request_branch(&self, slug: &str, number: u64) -> Result<()> {
        let operation = "update pull request branch";
        let response = self.send_json(
            operation,
            Method::PUT,
            &format!("/repos/{}/pulls/{}/update-branch", slug, number),
            &serde_json::json!({}),
        )?;
        check_status(operation, response)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(state: &str, total: u64) -> CombinedStatusResponse {
        CombinedStatusResponse {
            state: state.to_string(),
            total_count: total,
        }
    }

    fn checks(runs: &[(&str, Option<&str>)]) -> CheckRunsResponse {
        CheckRunsResponse {
            total_count: runs.len() as u64,
            check_runs: runs
                .iter()
                .map(|(status, conclusion)| CheckRun {
                    status: status.to_string(),
                    conclusion: conclusion.map(|c| c.to_string()),
                })
                .collect(),
        }
    }

    #[test]
    fn test_out_of_date_merge_refusals() {
        assert!(is_out_of_date("Base branch was modified. Review and try the merge again."));
        assert!(is_out_of_date("Pull Request has merge conflicts"));
        assert!(is_out_of_date("Head branch is out of date"));
        assert!(!is_out_of_date("At least 1 approving review is required by reviewers with write access."));
        assert!(!is_out_of_date("Required status check \"build\" is expected."));
    }

    #[test]
    fn test_no_reports_is_absent() {
        // GitHub reports "pending" for a commit with no statuses at all.
        assert_eq!(combine_ci(&statuses("pending", 0), &checks(&[])), CiStatus::Absent);
    }

    #[test]
    fn test_failure_wins() {
        let runs = checks(&[("completed", Some("success")), ("completed", Some("failure"))]);
        assert_eq!(combine_ci(&statuses("success", 1), &runs), CiStatus::Failure);
    }

    #[test]
    fn test_running_check_is_pending() {
        let runs = checks(&[("in_progress", None)]);
        assert_eq!(combine_ci(&statuses("success", 2), &runs), CiStatus::Pending);
    }

    #[test]
    fn test_skipped_checks_count_as_success() {
        let runs = checks(&[("completed", Some("success")), ("completed", Some("skipped"))]);
        assert_eq!(combine_ci(&statuses("pending", 0), &runs), CiStatus::Success);
    }

    #[test]
    fn test_permission_mapping() {
        let p = PermissionsResponse {
            push: true,
            pull: true,
            ..Default::default()
        };
        assert_eq!(Permission::from(p), Permission::Write);
        let p = PermissionsResponse {
            pull: true,
            ..Default::default()
        };
        assert_eq!(Permission::from(p), Permission::Read);
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#),
            "Not Found"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "502 Bad Gateway");
    }
}
