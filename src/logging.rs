//! Diagnostic tracing for operators.
//!
//! Tracing goes to stderr so that stdout stays reserved for rendered plans
//! and reports. Durable state (plans, ledger, sessions) never depends on it.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "release_orchestrator=info,warn",
        2 => "release_orchestrator=debug,info",
        _ => "trace",
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `-v` flags. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=release_orchestrator=debug release plan --channel app --mode strict
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
