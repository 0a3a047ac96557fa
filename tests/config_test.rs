// tests/config_test.rs
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use release_orchestrator::config::{load_config, CONFIG_FILE_NAME};
use release_orchestrator::domain::Channel;
use release_orchestrator::error::ReleaseError;
use release_orchestrator::infra::hosting::MergeMethod;
use serial_test::serial;
use tempfile::{NamedTempFile, TempDir};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/release.toml")
}

#[test]
fn test_load_fixture() {
    let config = load_config(Some(&fixture())).unwrap();

    assert_eq!(config.remote.api_url, "https://github.example.com/api/v3");
    assert_eq!(config.remote.token_env, "RELEASE_TOKEN");
    assert_eq!(config.remote.merge_method, MergeMethod::Merge);
    assert_eq!(config.timeouts.medium, 45);
    assert!(config.ci.require_checks);
    assert_eq!(config.publish.merge_attempts, 5);
    assert_eq!(config.configured_channels(), vec![Channel::App]);

    let (target, repo) = config.target(Channel::App).unwrap();
    assert_eq!(target, "game");
    assert_eq!(repo.branch, "main");
    let deps: Vec<&str> = config
        .dependencies(Channel::App)
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(deps, vec!["engine", "assets"]);
    assert_eq!(config.repo("assets").unwrap().branch, "release");
}

#[test]
fn test_unknown_target_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[repos.engine]
path = "../engine"
slug = "acme/engine"

[channels.content]
target = "site"
"#,
    )
    .unwrap();
    file.flush().unwrap();

    let err = load_config(Some(file.path())).unwrap_err();
    assert!(matches!(err, ReleaseError::Config(_)), "got {:?}", err);
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_malformed_file_is_config_error() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"[repos.engine\npath = ").unwrap();
    file.flush().unwrap();

    let err = load_config(Some(file.path())).unwrap_err();
    assert!(matches!(err, ReleaseError::Config(_)), "got {:?}", err);
}

#[test]
#[serial]
fn test_config_in_working_directory_is_found() {
    let dir = TempDir::new().unwrap();
    fs::copy(fixture(), dir.path().join(CONFIG_FILE_NAME)).unwrap();

    let previous = env::current_dir().unwrap();
    env::set_current_dir(dir.path()).unwrap();
    let loaded = load_config(None);
    env::set_current_dir(previous).unwrap();

    assert_eq!(loaded.unwrap().publish.merge_attempts, 5);
}
