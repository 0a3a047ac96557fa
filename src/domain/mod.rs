//! Domain logic - pure release rules independent of git, HTTP and the filesystem

pub mod classifier;
pub mod plan;
pub mod planner;
pub mod readiness;
pub mod version;

pub use classifier::{DiffClass, DiffClassifier, IncidentalPathClassifier};
pub use plan::{ArtifactRecord, Channel, PlanId, ReleasePlan, RequestedChange, ResolutionMode};
pub use planner::{BlockedError, PlanRequest, RepoBlock};
pub use readiness::{BlockingReason, RepoReadiness};
pub use version::{SemanticVersion, VersionBump};
