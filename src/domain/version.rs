use crate::error::{ReleaseError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Semantic version of a published release.
///
/// Ordering follows semver precedence: build metadata is ignored and a
/// pre-release sorts below the release with the same core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Option<String>,
    pub build: Option<String>,
}

impl SemanticVersion {
    /// Create a release version with no pre-release or build suffix
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        SemanticVersion {
            major,
            minor,
            patch,
            pre_release: None,
            build: None,
        }
    }

    /// Baseline used when a channel has never published.
    pub fn zero() -> Self {
        SemanticVersion::new(0, 0, 0)
    }

    /// Parse a version string (e.g., "v1.2.3-rc.1+build.5")
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let clean = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let parsed = semver::Version::parse(clean).map_err(|e| {
            ReleaseError::validation(format!(
                "invalid version '{}': {} (expected MAJOR.MINOR.PATCH[-PRE][+BUILD])",
                input, e
            ))
        })?;

        Ok(SemanticVersion {
            major: parsed.major,
            minor: parsed.minor,
            patch: parsed.patch,
            pre_release: (!parsed.pre.is_empty()).then(|| parsed.pre.as_str().to_string()),
            build: (!parsed.build.is_empty()).then(|| parsed.build.as_str().to_string()),
        })
    }

    pub fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }

    /// Next version for the given bump.
    ///
    /// A pre-release whose core already carries the bump is promoted to
    /// that release (1.0.0-rc.1 bumped major becomes 1.0.0), so the result
    /// is always strictly greater than `self`.
    pub fn bump(&self, bump: VersionBump) -> Self {
        let pre = self.is_pre_release();
        match bump {
            VersionBump::Major => {
                if pre && self.minor == 0 && self.patch == 0 {
                    SemanticVersion::new(self.major, 0, 0)
                } else {
                    SemanticVersion::new(self.major + 1, 0, 0)
                }
            }
            VersionBump::Minor => {
                if pre && self.patch == 0 {
                    SemanticVersion::new(self.major, self.minor, 0)
                } else {
                    SemanticVersion::new(self.major, self.minor + 1, 0)
                }
            }
            VersionBump::Patch => {
                if pre {
                    SemanticVersion::new(self.major, self.minor, self.patch)
                } else {
                    SemanticVersion::new(self.major, self.minor, self.patch + 1)
                }
            }
        }
    }
}

fn compare_pre_release(a: &str, b: &str) -> Ordering {
    match (semver::Prerelease::new(a), semver::Prerelease::new(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_pre_release(a, b),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        SemanticVersion::parse(s)
    }
}

impl TryFrom<String> for SemanticVersion {
    type Error = ReleaseError;

    fn try_from(value: String) -> Result<Self> {
        SemanticVersion::parse(&value)
    }
}

impl From<SemanticVersion> for String {
    fn from(value: SemanticVersion) -> Self {
        value.to_string()
    }
}

/// Version bump type decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionBump {
    Major,
    Minor,
    #[default]
    Patch,
}

impl VersionBump {
    pub const ALL: [VersionBump; 3] = [VersionBump::Major, VersionBump::Minor, VersionBump::Patch];

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionBump::Major => "major",
            VersionBump::Minor => "minor",
            VersionBump::Patch => "patch",
        }
    }
}

impl fmt::Display for VersionBump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionBump {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "major" => Ok(VersionBump::Major),
            "minor" => Ok(VersionBump::Minor),
            "patch" => Ok(VersionBump::Patch),
            other => Err(ReleaseError::validation(format!(
                "unknown bump '{}' (expected major, minor or patch)",
                other
            ))),
        }
    }
}
