use crate::domain::classifier::DEFAULT_INCIDENTAL_PATHS;
use crate::domain::Channel;
use crate::error::{ReleaseError, Result};
use crate::infra::hosting::MergeMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched in the working directory and the user config directory.
pub const CONFIG_FILE_NAME: &str = "release.toml";

/// Represents the complete configuration for the release orchestrator.
///
/// Contains the repository set, the two channel definitions, remote hosting
/// settings, timeout classes, retry and CI polling knobs, and hook scripts.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Where locks, the published ledger and guided sessions live
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Directory inside each target repository that holds release artifacts
    #[serde(default = "default_release_dir")]
    pub release_dir: String,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub ci: CiConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub resolve: ResolveConfig,

    #[serde(default)]
    pub smart: SmartConfig,

    #[serde(default)]
    pub repos: BTreeMap<String, RepoConfig>,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub hooks: HooksConfig,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".release")
}

fn default_release_dir() -> String {
    "release".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

/// One repository taking part in a release, either as dependency or target.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RepoConfig {
    /// Local working copy
    pub path: PathBuf,
    /// `owner/name` on the hosting service
    pub slug: String,
    /// Branch the working copy is expected to sit on
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Repository id that receives release pull requests
    pub target: String,
    /// Repository ids whose HEADs are pinned by the plan
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Build outputs recorded in the plan, if any
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub content: Option<ChannelConfig>,
    #[serde(default)]
    pub app: Option<ChannelConfig>,
}

impl ChannelsConfig {
    pub fn get(&self, channel: Channel) -> Option<&ChannelConfig> {
        match channel {
            Channel::Content => self.content.as_ref(),
            Channel::App => self.app.as_ref(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_git_remote() -> String {
    "origin".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RemoteConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable holding the API token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub merge_method: MergeMethod,
    #[serde(default = "default_git_remote")]
    pub git_remote: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            api_url: default_api_url(),
            token_env: default_token_env(),
            merge_method: MergeMethod::default(),
            git_remote: default_git_remote(),
        }
    }
}

/// Budgets, in seconds, for each timeout class.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub short: u64,
    pub medium: u64,
    pub long: u64,
    pub watch: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            short: 10,
            medium: 60,
            long: 30 * 60,
            watch: 2 * 60 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CiConfig {
    pub poll_interval_secs: u64,
    pub max_poll_interval_secs: u64,
    /// Treat a commit with no reported checks as not ready instead of green
    pub require_checks: bool,
}

impl Default for CiConfig {
    fn default() -> Self {
        CiConfig {
            poll_interval_secs: 10,
            max_poll_interval_secs: 120,
            require_checks: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PublishConfig {
    /// Merge attempts, including retries after a conflict
    pub merge_attempts: u32,
    pub allow_dirty: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            merge_attempts: 3,
            allow_dirty: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ResolveConfig {
    /// Upper bound on concurrent repository reads
    pub workers: usize,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        ResolveConfig { workers: 4 }
    }
}

fn default_incidental_paths() -> Vec<String> {
    DEFAULT_INCIDENTAL_PATHS.iter().map(|p| p.to_string()).collect()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SmartConfig {
    /// Regexes matched against changed paths, relative to the repository root
    #[serde(default = "default_incidental_paths")]
    pub incidental_paths: Vec<String>,
}

impl Default for SmartConfig {
    fn default() -> Self {
        SmartConfig {
            incidental_paths: default_incidental_paths(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct HooksConfig {
    pub pre_publish: Option<PathBuf>,
    pub post_publish: Option<PathBuf>,
    pub post_remove: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            state_dir: default_state_dir(),
            release_dir: default_release_dir(),
            remote: RemoteConfig::default(),
            timeouts: TimeoutsConfig::default(),
            retry: RetryConfig::default(),
            ci: CiConfig::default(),
            publish: PublishConfig::default(),
            resolve: ResolveConfig::default(),
            smart: SmartConfig::default(),
            repos: BTreeMap::new(),
            channels: ChannelsConfig::default(),
            hooks: HooksConfig::default(),
        }
    }
}

impl Config {
    /// Channel definition, or a validation error naming the missing section.
    pub fn channel(&self, channel: Channel) -> Result<&ChannelConfig> {
        self.channels.get(channel).ok_or_else(|| {
            ReleaseError::validation(format!(
                "channel '{}' is not configured (add a [channels.{}] section)",
                channel, channel
            ))
        })
    }

    pub fn configured_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.channels.get(*c).is_some())
            .collect()
    }

    pub fn repo(&self, repo_id: &str) -> Result<&RepoConfig> {
        self.repos
            .get(repo_id)
            .ok_or_else(|| ReleaseError::config(format!("unknown repository '{}'", repo_id)))
    }

    /// Target repository id and definition for a channel.
    pub fn target(&self, channel: Channel) -> Result<(&str, &RepoConfig)> {
        let channel_config = self.channel(channel)?;
        let repo = self.repo(&channel_config.target)?;
        Ok((channel_config.target.as_str(), repo))
    }

    /// Dependency repositories of a channel, in declaration order.
    pub fn dependencies(&self, channel: Channel) -> Result<Vec<(&str, &RepoConfig)>> {
        self.channel(channel)?
            .dependencies
            .iter()
            .map(|id| Ok((id.as_str(), self.repo(id)?)))
            .collect()
    }

    /// Check cross-references and numeric bounds.
    pub fn validate(&self) -> Result<()> {
        for channel in self.configured_channels() {
            let channel_config = self.channel(channel)?;
            if !self.repos.contains_key(&channel_config.target) {
                return Err(ReleaseError::config(format!(
                    "channel '{}' targets unknown repository '{}'",
                    channel, channel_config.target
                )));
            }
            for dep in &channel_config.dependencies {
                if !self.repos.contains_key(dep) {
                    return Err(ReleaseError::config(format!(
                        "channel '{}' depends on unknown repository '{}'",
                        channel, dep
                    )));
                }
            }
        }

        for (id, repo) in &self.repos {
            if repo.slug.split('/').filter(|s| !s.is_empty()).count() != 2 {
                return Err(ReleaseError::config(format!(
                    "repository '{}' has invalid slug '{}' (expected owner/name)",
                    id, repo.slug
                )));
            }
        }

        if self.publish.merge_attempts == 0 {
            return Err(ReleaseError::config("publish.merge_attempts must be at least 1"));
        }
        if self.resolve.workers == 0 {
            return Err(ReleaseError::config("resolve.workers must be at least 1"));
        }
        if self.release_dir.trim().is_empty() {
            return Err(ReleaseError::config("release_dir must not be empty"));
        }
        Ok(())
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `release.toml` in current directory
/// 3. `release/release.toml` in user config directory
/// 4. Default configuration if no file found
///
/// The loaded configuration is validated before it is returned.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let source = if let Some(path) = config_path {
        Some(path.to_path_buf())
    } else if Path::new(CONFIG_FILE_NAME).exists() {
        Some(PathBuf::from(CONFIG_FILE_NAME))
    } else {
        dirs::config_dir()
            .map(|dir| dir.join("release").join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    };

    let config = match source {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            let contents = fs::read_to_string(&path).map_err(|e| {
                ReleaseError::config(format!("cannot read {}: {}", path.display(), e))
            })?;
            parse_config(&contents)
                .map_err(|e| ReleaseError::config(format!("{}: {}", path.display(), e)))?
        }
        None => {
            tracing::debug!("no configuration file found, using defaults");
            Config::default()
        }
    };

    config.validate()?;
    Ok(config)
}

/// Parse configuration text without validating it.
pub fn parse_config(contents: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str(contents)
}
