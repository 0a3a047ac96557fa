use crate::domain::{Channel, SemanticVersion};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Points in the release lifecycle where operator scripts run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookType {
    PrePublish,
    PostPublish,
    PostRemove,
}

impl HookType {
    /// Get the hook name as a string
    pub fn name(&self) -> &'static str {
        match self {
            HookType::PrePublish => "pre-publish",
            HookType::PostPublish => "post-publish",
            HookType::PostRemove => "post-remove",
        }
    }
}

/// Context information passed to a hook
#[derive(Debug, Clone)]
pub struct HookContext {
    pub hook_type: HookType,
    pub channel: Channel,
    pub version: SemanticVersion,
    /// Plan file the operation works from
    pub plan_path: PathBuf,
    /// Pull request opened by the operation, once there is one
    pub pull_request: Option<u64>,
}

impl HookContext {
    /// Convert context to environment variables for the hook script
    ///
    /// Maps context fields to RELEASE_* environment variables
    pub fn to_env_vars(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();

        env.insert("RELEASE_HOOK".to_string(), self.hook_type.name().to_string());
        env.insert("RELEASE_CHANNEL".to_string(), self.channel.to_string());
        env.insert("RELEASE_VERSION".to_string(), self.version.to_string());
        env.insert("RELEASE_PLAN".to_string(), self.plan_path.display().to_string());

        if let Some(number) = self.pull_request {
            env.insert("RELEASE_PR_NUMBER".to_string(), number.to_string());
        }

        env
    }
}
