// tests/github_client_test.rs
use std::time::Duration;

use mockito::{Matcher, Server};
use release_orchestrator::error::ReleaseError;
use release_orchestrator::infra::hosting::{
    CiStatus, GitHubClient, HostingApi, MergeMethod, NewPullRequest, Permission, PrStatus,
};
use release_orchestrator::infra::CallPolicy;

fn policy() -> CallPolicy {
    CallPolicy {
        short: Duration::from_secs(2),
        medium: Duration::from_secs(5),
        long: Duration::from_secs(5),
        watch: Duration::from_secs(5),
        backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

fn client(server: &Server, token: Option<&str>) -> GitHubClient {
    GitHubClient::new(server.url(), token.map(str::to_string), policy()).unwrap()
}

const PULL_JSON: &str = r#"{
    "number": 42,
    "state": "closed",
    "merged": true,
    "html_url": "https://github.com/acme/app/pull/42",
    "head": {"ref": "release/app-v1.5.0", "sha": "abc123"},
    "base": {"ref": "main", "sha": "def456"}
}"#;

#[test]
fn test_permission_sends_token_and_maps_push() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/repos/acme/app")
        .match_header("authorization", "Bearer secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"permissions": {"admin": false, "push": true, "pull": true}}"#)
        .create();

    let permission = client(&server, Some("secret")).permission("acme/app").unwrap();
    assert_eq!(permission, Permission::Write);
    mock.assert();
}

#[test]
fn test_server_errors_on_reads_are_retried_three_times() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/repos/acme/app/commits/abc123/status")
        .with_status(500)
        .with_body("boom")
        .expect(3)
        .create();

    let err = client(&server, None).ci_status("acme/app", "abc123").unwrap_err();
    match err {
        ReleaseError::TransientInfra { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error {:?}", other),
    }
    mock.assert();
}

#[test]
fn test_ci_status_combines_statuses_and_checks() {
    let mut server = Server::new();
    let statuses = server
        .mock("GET", "/repos/acme/app/commits/abc123/status")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"state": "success", "total_count": 1}"#)
        .create();
    let checks = server
        .mock("GET", "/repos/acme/app/commits/abc123/check-runs")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"total_count": 1, "check_runs": [{"status": "in_progress", "conclusion": null}]}"#)
        .create();

    let status = client(&server, None).ci_status("acme/app", "abc123").unwrap();
    assert_eq!(status, CiStatus::Pending);
    statuses.assert();
    checks.assert();
}

#[test]
fn test_create_pull_request_is_sent_once() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/repos/acme/app/pulls")
        .match_body(Matcher::PartialJsonString(
            r#"{"head": "release/app-v1.5.0", "base": "main"}"#.to_string(),
        ))
        .with_status(502)
        .with_body("bad gateway")
        .expect(1)
        .create();

    let request = NewPullRequest {
        title: "release(app): v1.5.0".to_string(),
        body: "notes".to_string(),
        head: "release/app-v1.5.0".to_string(),
        base: "main".to_string(),
    };
    let err = client(&server, None).create_pull_request("acme/app", &request).unwrap_err();
    assert!(err.is_transient(), "got {:?}", err);
    mock.assert();
}

#[test]
fn test_find_pull_request_reads_merged_state() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/repos/acme/app/pulls")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!("[{}]", PULL_JSON))
        .create();

    let found = client(&server, None)
        .find_pull_request("acme/app", "release/app-v1.5.0", "main")
        .unwrap()
        .unwrap();
    assert_eq!(found.number, 42);
    assert_eq!(found.status, PrStatus::Merged);
    assert_eq!(found.head_sha.as_deref(), Some("abc123"));
    mock.assert();
}

#[test]
fn test_unmergeable_pull_request_is_a_conflict() {
    let mut server = Server::new();
    let mock = server
        .mock("PUT", "/repos/acme/app/pulls/42/merge")
        .with_status(405)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "Base branch was modified. Review and try the merge again."}"#)
        .create();

    let err = client(&server, None)
        .merge_pull_request("acme/app", 42, MergeMethod::Squash)
        .unwrap_err();
    match err {
        ReleaseError::MergeConflict { number, message, .. } => {
            assert_eq!(number, 42);
            assert!(message.starts_with("Base branch was modified"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    mock.assert();
}

#[test]
fn test_merge_refused_for_missing_review_is_not_a_conflict() {
    let mut server = Server::new();
    let mock = server
        .mock("PUT", "/repos/acme/app/pulls/42/merge")
        .with_status(405)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message": "At least 1 approving review is required by reviewers with write access."}"#)
        .expect(1)
        .create();

    let err = client(&server, None)
        .merge_pull_request("acme/app", 42, MergeMethod::Squash)
        .unwrap_err();
    match err {
        ReleaseError::Remote { status, message, .. } => {
            assert_eq!(status, Some(405));
            assert!(message.contains("approving review"), "got {}", message);
        }
        other => panic!("unexpected error {:?}", other),
    }
    mock.assert();
}

#[test]
fn test_forbidden_is_not_retried() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/repos/acme/app/pulls/7")
        .with_status(403)
        .with_body(r#"{"message": "Resource not accessible by integration"}"#)
        .expect(1)
        .create();

    let err = client(&server, None).pull_request("acme/app", 7).unwrap_err();
    match err {
        ReleaseError::Remote { status, .. } => assert_eq!(status, Some(403)),
        other => panic!("unexpected error {:?}", other),
    }
    mock.assert();
}
