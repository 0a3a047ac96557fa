// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use release_orchestrator::config::{ChannelConfig, Config, RepoConfig};
use release_orchestrator::flow::FlowContext;
use release_orchestrator::git::{MockRepoProvider, MockWorkingCopy};
use release_orchestrator::infra::hosting::MockHosting;
use release_orchestrator::infra::{CallPolicy, CiSettings};
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub ctx: FlowContext,
    pub hosting: Arc<MockHosting>,
    pub app: MockWorkingCopy,
    pub engine: MockWorkingCopy,
    pub assets: MockWorkingCopy,
}

pub fn fast_policy() -> CallPolicy {
    CallPolicy {
        short: Duration::from_millis(200),
        medium: Duration::from_millis(500),
        long: Duration::from_millis(300),
        watch: Duration::from_millis(300),
        backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

pub fn fast_ci() -> CiSettings {
    CiSettings {
        poll_interval: Duration::from_millis(5),
        max_poll_interval: Duration::from_millis(20),
        require_checks: false,
    }
}

fn repo(dir: &TempDir, id: &str) -> RepoConfig {
    RepoConfig {
        path: dir.path().join(id),
        slug: format!("acme/{}", id),
        branch: "main".to_string(),
    }
}

/// App channel targeting `app`, pinning `engine` and `assets`.
pub fn harness(hosting: MockHosting) -> Harness {
    harness_with(hosting, |_| {})
}

pub fn harness_with(hosting: MockHosting, adjust: impl FnOnce(&mut Config)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = Config {
        state_dir: dir.path().join("state"),
        ..Config::default()
    };
    for id in ["app", "engine", "assets"] {
        config.repos.insert(id.to_string(), repo(&dir, id));
    }
    config.channels.app = Some(ChannelConfig {
        target: "app".to_string(),
        dependencies: vec!["engine".to_string(), "assets".to_string()],
        artifacts_dir: None,
    });
    adjust(&mut config);

    let app = MockWorkingCopy::new(dir.path().join("app"), "app-head", "main");
    let engine = MockWorkingCopy::new(dir.path().join("engine"), "engine-1", "main");
    let assets = MockWorkingCopy::new(dir.path().join("assets"), "assets-1", "main");
    let repos = MockRepoProvider::new()
        .with_repo("app", app.clone())
        .with_repo("engine", engine.clone())
        .with_repo("assets", assets.clone());

    let hosting = Arc::new(hosting);
    let ctx = FlowContext::new(config, hosting.clone(), Arc::new(repos))
        .unwrap()
        .with_policy(fast_policy())
        .with_ci(fast_ci());

    Harness {
        dir,
        ctx,
        hosting,
        app,
        engine,
        assets,
    }
}
