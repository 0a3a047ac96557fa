//! Timeout classes and the bounded retry policy shared by every remote call.
//!
//! Reads may be retried when the failure is transient. Writes are issued
//! exactly once; repeating them is left to the idempotent higher-level
//! operation that owns them.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ReleaseError, Result};

/// Total attempts for a retried read, the first one included.
pub const READ_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutClass {
    /// Local reads and lookups
    Short,
    /// Single remote requests and pushes
    Medium,
    /// Waiting on CI
    Long,
    /// Operator-facing watch loops
    Watch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
    pub watch: Duration,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        CallPolicy::from_config(&Config::default())
    }
}

impl CallPolicy {
    pub fn from_config(config: &Config) -> Self {
        CallPolicy {
            short: Duration::from_secs(config.timeouts.short),
            medium: Duration::from_secs(config.timeouts.medium),
            long: Duration::from_secs(config.timeouts.long),
            watch: Duration::from_secs(config.timeouts.watch),
            backoff: Duration::from_millis(config.retry.backoff_ms),
            max_backoff: Duration::from_millis(config.retry.max_backoff_ms),
        }
    }

    pub fn timeout(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Short => self.short,
            TimeoutClass::Medium => self.medium,
            TimeoutClass::Long => self.long,
            TimeoutClass::Watch => self.watch,
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Run a read, retrying transient failures up to [`READ_ATTEMPTS`] in total.
    ///
    /// `call` receives the budget for its timeout class and must enforce it.
    pub fn read<T, F>(&self, class: TimeoutClass, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut(Duration) -> Result<T>,
    {
        let budget = self.timeout(class);
        let mut attempt = 1;
        loop {
            match call(budget) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < READ_ATTEMPTS => {
                    let delay = self.backoff_for(attempt);
                    warn!(operation, attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient failure, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(ReleaseError::TransientInfra { message, .. }) => {
                    return Err(ReleaseError::TransientInfra {
                        operation: operation.to_string(),
                        attempts: attempt,
                        message,
                    })
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run a write once within its timeout budget.
    pub fn write<T, F>(&self, class: TimeoutClass, operation: &str, call: F) -> Result<T>
    where
        F: FnOnce(Duration) -> Result<T>,
    {
        debug!(operation, "issuing write");
        call(self.timeout(class))
    }
}
