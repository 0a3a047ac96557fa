//! Per-channel exclusive lock for mutating release operations.
//!
//! The lock file is created with `create_new`, so two processes can never
//! both hold it. A lock whose owner process is gone is recovered, never
//! silently: it is moved aside, logged, and reported to the caller.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::Channel;
use crate::error::{ReleaseError, Result};

pub const LOCK_FILE: &str = "release.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub operation: String,
    #[serde(default)]
    pub user: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

impl LockOwner {
    fn current(operation: &str) -> Self {
        LockOwner {
            pid: std::process::id(),
            operation: operation.to_string(),
            user: std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok(),
            acquired_at: Utc::now(),
        }
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {} ({}", self.pid, self.operation)?;
        if let Some(user) = &self.user {
            write!(f, " by {}", user)?;
        }
        write!(f, ", since {})", self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Who holds a channel lock right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Free,
    Held(LockOwner),
    /// Lock file names a process that no longer exists
    Stale(LockOwner),
}

pub fn lock_path(state_dir: &Path, channel: Channel) -> PathBuf {
    state_dir.join(channel.as_str()).join(LOCK_FILE)
}

/// Check whether a process is running.
pub fn is_pid_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .output()
            .map(|o| kill_reports_alive(o.status.success(), &String::from_utf8_lossy(&o.stderr)))
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        // Without a liveness probe, treat every recorded owner as alive.
        let _ = pid;
        true
    }
}

/// `kill -0` on another user's process fails with EPERM, yet the process exists.
#[cfg(unix)]
fn kill_reports_alive(success: bool, stderr: &str) -> bool {
    success || stderr.contains("Operation not permitted")
}

fn read_owner(path: &Path) -> Result<Option<LockOwner>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            ReleaseError::config(format!(
                "lock file {} is unreadable ({}); remove it once no release is running",
                path.display(),
                e
            ))
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Held lock, released on drop.
#[derive(Debug)]
pub struct ReleaseLock {
    path: PathBuf,
    owner: LockOwner,
    recovered: Option<LockOwner>,
}

impl ReleaseLock {
    /// Acquire the lock for `channel` or fail with `LockHeld`.
    pub fn acquire(state_dir: &Path, channel: Channel, operation: &str) -> Result<Self> {
        let path = lock_path(state_dir, channel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let owner = LockOwner::current(operation);
        let mut recovered = None;

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&serde_json::to_vec(&owner)?)?;
                    file.sync_all()?;
                    debug!(%channel, operation, "lock acquired");
                    return Ok(ReleaseLock {
                        path,
                        owner,
                        recovered,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let Some(existing) = read_owner(&path)? else {
                        // Released between our create and read.
                        continue;
                    };
                    if is_pid_alive(existing.pid) {
                        return Err(ReleaseError::LockHeld {
                            channel,
                            owner: existing,
                        });
                    }
                    warn!(%channel, stale_owner = %existing, "recovering stale release lock");
                    fs::rename(&path, path.with_extension("lock.stale"))?;
                    recovered = Some(existing);
                }
                Err(e) => return Err(e.into()),
            }
        }

        match read_owner(&path)? {
            Some(existing) => Err(ReleaseError::LockHeld {
                channel,
                owner: existing,
            }),
            None => Err(ReleaseError::config(format!(
                "could not acquire {} after recovery",
                path.display()
            ))),
        }
    }

    /// Inspect a channel lock without taking it.
    pub fn inspect(state_dir: &Path, channel: Channel) -> Result<LockState> {
        Ok(match read_owner(&lock_path(state_dir, channel))? {
            None => LockState::Free,
            Some(owner) if is_pid_alive(owner.pid) => LockState::Held(owner),
            Some(owner) => LockState::Stale(owner),
        })
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// The dead owner this acquisition displaced, if any.
    pub fn recovered(&self) -> Option<&LockOwner> {
        self.recovered.as_ref()
    }
}

impl Drop for ReleaseLock {
    fn drop(&mut self) {
        match read_owner(&self.path) {
            Ok(Some(current)) if current == self.owner => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "failed to release lock");
                } else {
                    info!(operation = %self.owner.operation, "lock released");
                }
            }
            _ => debug!(path = %self.path.display(), "lock no longer ours, leaving it"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(dir.path(), Channel::App);
        {
            let lock = ReleaseLock::acquire(dir.path(), Channel::App, "publish").unwrap();
            assert!(path.exists());
            assert_eq!(lock.owner().operation, "publish");
            assert!(lock.recovered().is_none());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_is_rejected() {
        let dir = TempDir::new().unwrap();
        let _held = ReleaseLock::acquire(dir.path(), Channel::App, "publish").unwrap();
        let err = ReleaseLock::acquire(dir.path(), Channel::App, "prepare").unwrap_err();
        match err {
            ReleaseError::LockHeld { channel, owner } => {
                assert_eq!(channel, Channel::App);
                assert_eq!(owner.operation, "publish");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_channels_lock_independently() {
        let dir = TempDir::new().unwrap();
        let _app = ReleaseLock::acquire(dir.path(), Channel::App, "publish").unwrap();
        assert!(ReleaseLock::acquire(dir.path(), Channel::Content, "publish").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_lock_is_recovered_and_reported() {
        let dir = TempDir::new().unwrap();
        let path = lock_path(dir.path(), Channel::App);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let stale = LockOwner {
            pid: dead_pid(),
            operation: "publish".to_string(),
            user: None,
            acquired_at: Utc::now(),
        };
        fs::write(&path, serde_json::to_vec(&stale).unwrap()).unwrap();

        assert_eq!(
            ReleaseLock::inspect(dir.path(), Channel::App).unwrap(),
            LockState::Stale(stale.clone())
        );
        let lock = ReleaseLock::acquire(dir.path(), Channel::App, "prepare").unwrap();
        assert_eq!(lock.recovered(), Some(&stale));
        assert!(path.with_extension("lock.stale").exists());
    }

    #[test]
    fn test_inspect_free_and_held() {
        let dir = TempDir::new().unwrap();
        assert_eq!(ReleaseLock::inspect(dir.path(), Channel::App).unwrap(), LockState::Free);
        let _lock = ReleaseLock::acquire(dir.path(), Channel::App, "publish").unwrap();
        assert!(matches!(
            ReleaseLock::inspect(dir.path(), Channel::App).unwrap(),
            LockState::Held(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_of_another_user_counts_as_alive() {
        assert!(kill_reports_alive(false, "kill: (1) - Operation not permitted\n"));
        assert!(!kill_reports_alive(false, "kill: (4242) - No such process\n"));
        assert!(kill_reports_alive(true, ""));
    }
}
