//! Waits for a commit's CI to turn green within the long timeout class.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use crate::config::CiConfig;
use crate::error::{ReleaseError, Result};
use crate::infra::cancel::CancelFlag;
use crate::infra::hosting::{CiStatus, HostingApi};
use crate::infra::policy::{CallPolicy, TimeoutClass};

#[derive(Debug, Clone, PartialEq)]
pub struct CiSettings {
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
    pub require_checks: bool,
}

impl From<&CiConfig> for CiSettings {
    fn from(config: &CiConfig) -> Self {
        CiSettings {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_poll_interval: Duration::from_secs(config.max_poll_interval_secs),
            require_checks: config.require_checks,
        }
    }
}

impl Default for CiSettings {
    fn default() -> Self {
        CiSettings::from(&CiConfig::default())
    }
}

pub struct CiGate<'a> {
    hosting: &'a dyn HostingApi,
    policy: &'a CallPolicy,
    settings: &'a CiSettings,
}

impl<'a> CiGate<'a> {
    pub fn new(hosting: &'a dyn HostingApi, policy: &'a CallPolicy, settings: &'a CiSettings) -> Self {
        CiGate {
            hosting,
            policy,
            settings,
        }
    }

    /// Poll until CI is green, red, or the long budget runs out.
    ///
    /// A commit with no checks passes unless checks are required.
    #[instrument(skip(self, cancel))]
    pub fn wait_for_green(&self, slug: &str, git_ref: &str, cancel: Option<&CancelFlag>) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.policy.timeout(TimeoutClass::Long);
        let mut interval = self.settings.poll_interval;

        loop {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(ReleaseError::Cancelled(format!("waiting for CI on {}@{}", slug, git_ref)));
            }

            let status = self.hosting.ci_status(slug, git_ref)?;
            debug!(%status, "polled CI");
            match status {
                CiStatus::Success => {
                    info!(waited_secs = started.elapsed().as_secs(), "CI is green");
                    return Ok(());
                }
                CiStatus::Absent if !self.settings.require_checks => {
                    info!("no CI checks reported, treating as green");
                    return Ok(());
                }
                CiStatus::Failure => {
                    return Err(ReleaseError::CiFailed {
                        slug: slug.to_string(),
                        git_ref: git_ref.to_string(),
                    })
                }
                CiStatus::Pending | CiStatus::Absent => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ReleaseError::CiNotReady {
                    slug: slug.to_string(),
                    git_ref: git_ref.to_string(),
                    status,
                    waited: started.elapsed(),
                });
            }

            let pause = interval.min(deadline - now);
            let completed = match cancel {
                Some(flag) => flag.sleep(pause),
                None => {
                    std::thread::sleep(pause);
                    true
                }
            };
            if !completed {
                return Err(ReleaseError::Cancelled(format!("waiting for CI on {}@{}", slug, git_ref)));
            }
            interval = (interval * 2).min(self.settings.max_poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::hosting::MockHosting;

    fn policy(long_ms: u64) -> CallPolicy {
        CallPolicy {
            long: Duration::from_millis(long_ms),
            backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            ..CallPolicy::default()
        }
    }

    fn settings(require_checks: bool) -> CiSettings {
        CiSettings {
            poll_interval: Duration::from_millis(5),
            max_poll_interval: Duration::from_millis(10),
            require_checks,
        }
    }

    #[test]
    fn test_waits_through_pending() {
        let hosting = MockHosting::new().with_ci("abc", &[CiStatus::Pending, CiStatus::Pending, CiStatus::Success]);
        let (policy, settings) = (policy(2_000), settings(false));
        CiGate::new(&hosting, &policy, &settings)
            .wait_for_green("acme/app", "abc", None)
            .unwrap();
        assert_eq!(hosting.count_calls("ci_status"), 3);
    }

    #[test]
    fn test_red_ci_fails_immediately() {
        let hosting = MockHosting::new().with_ci("abc", &[CiStatus::Failure]);
        let (policy, settings) = (policy(2_000), settings(false));
        let err = CiGate::new(&hosting, &policy, &settings)
            .wait_for_green("acme/app", "abc", None)
            .unwrap_err();
        assert!(matches!(err, ReleaseError::CiFailed { .. }));
    }

    #[test]
    fn test_pending_past_deadline_is_not_ready() {
        let hosting = MockHosting::new().with_ci("abc", &[CiStatus::Pending]);
        let (policy, settings) = (policy(40), settings(false));
        let err = CiGate::new(&hosting, &policy, &settings)
            .wait_for_green("acme/app", "abc", None)
            .unwrap_err();
        assert!(matches!(err, ReleaseError::CiNotReady { status: CiStatus::Pending, .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_NOT_READY);
    }

    #[test]
    fn test_absent_checks() {
        let hosting = MockHosting::new().with_ci("abc", &[CiStatus::Absent]);
        let policy = policy(30);
        let lenient = settings(false);
        assert!(CiGate::new(&hosting, &policy, &lenient)
            .wait_for_green("acme/app", "abc", None)
            .is_ok());

        let strict = settings(true);
        let err = CiGate::new(&hosting, &policy, &strict)
            .wait_for_green("acme/app", "abc", None)
            .unwrap_err();
        assert!(matches!(err, ReleaseError::CiNotReady { status: CiStatus::Absent, .. }));
    }

    #[test]
    fn test_cancelled_before_polling() {
        let hosting = MockHosting::new();
        let (policy, settings) = (policy(2_000), settings(false));
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = CiGate::new(&hosting, &policy, &settings)
            .wait_for_green("acme/app", "abc", Some(&cancel))
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Cancelled(_)));
        assert_eq!(hosting.count_calls("ci_status"), 0);
    }
}
