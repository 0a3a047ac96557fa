use crate::error::{ReleaseError, Result};
use crate::hooks::HookContext;
use crate::infra::process::run_command_with_timeout;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

/// Executes release hook scripts
pub struct HookExecutor;

impl HookExecutor {
    /// Execute a hook script with the given context
    ///
    /// The script runs with RELEASE_* environment variables and is killed
    /// once `timeout` elapses. Exit code 0 is success, anything else fails.
    ///
    /// # Returns
    /// * `Ok(())` if hook succeeds (exit code 0)
    /// * `Err` if script not found, times out, or returns non-zero exit code
    pub fn execute(script_path: &Path, context: &HookContext, timeout: Duration) -> Result<()> {
        if !script_path.exists() {
            return Err(ReleaseError::hook(format!(
                "Hook script not found: {}",
                script_path.display()
            )));
        }

        if !script_path.is_file() {
            return Err(ReleaseError::hook(format!(
                "Hook path is not a file: {}",
                script_path.display()
            )));
        }

        let mut cmd = Command::new(script_path);
        cmd.envs(context.to_env_vars());

        let output = run_command_with_timeout(cmd, timeout).map_err(|e| {
            ReleaseError::hook(format!("Failed to execute hook {}: {}", script_path.display(), e))
        })?;

        if output.timed_out {
            return Err(ReleaseError::hook(format!(
                "Hook {} timed out after {}s",
                script_path.display(),
                timeout.as_secs()
            )));
        }

        if !output.status.success() {
            return Err(ReleaseError::hook(format!(
                "Hook {} failed with exit code {}\nStdout: {}\nStderr: {}",
                script_path.display(),
                output.status.code().unwrap_or(-1),
                output.stdout.trim(),
                output.stderr.trim()
            )));
        }

        info!(hook = context.hook_type.name(), "hook succeeded");
        Ok(())
    }

    /// Try to execute a hook, logging errors but not failing
    ///
    /// Used for post-operation hooks where the merge has already happened and
    /// a hook failure must not retroactively fail the operation.
    pub fn execute_permissive(script_path: &Path, context: &HookContext, timeout: Duration) {
        if let Err(e) = Self::execute(script_path, context, timeout) {
            warn!(hook = context.hook_type.name(), error = %e, "hook failed, continuing");
        }
    }
}
