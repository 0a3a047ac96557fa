//! Release hooks for extensibility
//!
//! Allows operators to run custom scripts at key release points:
//! - pre-publish: After artifacts are verified, before the release branch is pushed
//! - post-publish: After the release pull request merged
//! - post-remove: After the revert pull request merged

pub mod executor;
pub mod lifecycle;

pub use executor::HookExecutor;
pub use lifecycle::{HookContext, HookType};
