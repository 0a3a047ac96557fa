pub mod config;
pub mod domain;
pub mod error;
pub mod flow;
pub mod git;
pub mod hooks;
pub mod infra;
pub mod logging;
pub mod resolve;
pub mod view;

pub use error::{ReleaseError, Result};
