//! Release artifacts on disk: the plan file, release notes and VERSION file.
//!
//! Every file is rendered purely from a [`ReleasePlan`] and written
//! atomically, so re-running with the same plan leaves the tree untouched.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::{ArtifactRecord, Channel, ReleasePlan};
use crate::error::{ReleaseError, Result};

pub const PLAN_FILE: &str = "plan.json";
pub const NOTES_FILE: &str = "RELEASE_NOTES.md";
pub const VERSION_FILE: &str = "VERSION";

fn write_error(path: &Path, source: io::Error) -> ReleaseError {
    ReleaseError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    write_atomically(path, data, |_| Ok(()))
}

fn write_atomically<F>(path: &Path, data: &[u8], before_rename: F) -> Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| write_error(path, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| write_error(path, e))?;
    tmp.write_all(data).map_err(|e| write_error(path, e))?;
    tmp.as_file().sync_all().map_err(|e| write_error(path, e))?;
    before_rename(tmp.path()).map_err(|e| write_error(path, e))?;
    tmp.persist(path).map_err(|e| write_error(path, e.error))?;
    Ok(())
}

/// Write only when the content differs. Returns true if the file changed.
pub fn write_if_changed(path: &Path, data: &[u8]) -> Result<bool> {
    match fs::read(path) {
        Ok(existing) if existing == data => {
            debug!(path = %path.display(), "unchanged");
            Ok(false)
        }
        _ => {
            atomic_write(path, data)?;
            Ok(true)
        }
    }
}

pub fn plan_bytes(plan: &ReleasePlan) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(plan)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn read_plan(path: &Path) -> Result<ReleasePlan> {
    let contents = fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ReleaseError::validation(format!("plan file {} does not exist", path.display()))
        } else {
            ReleaseError::Io(e)
        }
    })?;
    Ok(serde_json::from_slice(&contents)?)
}

pub fn render_version_file(plan: &ReleasePlan) -> String {
    format!("{}\n", plan.version)
}

pub fn render_release_notes(plan: &ReleasePlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} release v{}", plan.channel, plan.version);
    let _ = writeln!(out);
    let _ = writeln!(out, "- Mode: {}", plan.mode);
    let _ = writeln!(out, "- Plan: {}", plan.id().short());
    let _ = writeln!(out, "- Resolved: {}", plan.created_at.to_rfc3339());
    let _ = writeln!(out);
    let _ = writeln!(out, "## Sources");
    let _ = writeln!(out);
    if plan.source_refs.is_empty() {
        let _ = writeln!(out, "No dependency repositories.");
    } else {
        let _ = writeln!(out, "| Repository | Commit |");
        let _ = writeln!(out, "|---|---|");
        for (repo, commit) in &plan.source_refs {
            let _ = writeln!(out, "| {} | `{}` |", repo, commit);
        }
    }

    let warnings: Vec<_> = plan.warnings().collect();
    if !warnings.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Readiness warnings");
        let _ = writeln!(out);
        for diagnostic in warnings {
            if let Some(reason) = &diagnostic.blocking_reason {
                let _ = writeln!(out, "- {}: {}", diagnostic.repo_id, reason);
            }
        }
    }

    if !plan.artifacts.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Artifacts");
        let _ = writeln!(out);
        let _ = writeln!(out, "| File | Size | SHA-256 |");
        let _ = writeln!(out, "|---|---|---|");
        for artifact in &plan.artifacts {
            let _ = writeln!(out, "| {} | {} | `{}` |", artifact.name, artifact.size, artifact.sha256);
        }
    }
    out
}

pub fn render_pull_request_body(plan: &ReleasePlan) -> String {
    format!(
        "{}\n---\nPlan id: `{}`\n",
        render_release_notes(plan),
        plan.id().as_str()
    )
}

pub fn render_removal_body(plan: &ReleasePlan, previous: Option<&ReleasePlan>) -> String {
    let restored = match previous {
        Some(prev) => format!("Restores the {} release v{} artifacts.", prev.channel, prev.version),
        None => format!("Removes the {} release artifacts; no earlier release remains.", plan.channel),
    };
    format!(
        "Reverts {} release v{} (plan `{}`).\n\n{}\n",
        plan.channel,
        plan.version,
        plan.id().as_str(),
        restored
    )
}

/// The artifact files of one channel inside a target working copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSet {
    root: PathBuf,
    relative_dir: PathBuf,
}

impl ArtifactSet {
    pub fn new(root: &Path, release_dir: &str, channel: Channel) -> Self {
        ArtifactSet {
            root: root.to_path_buf(),
            relative_dir: Path::new(release_dir).join(channel.as_str()),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.relative_dir)
    }

    pub fn plan_path(&self) -> PathBuf {
        self.dir().join(PLAN_FILE)
    }

    /// Paths relative to the working copy root, in commit order.
    pub fn relative_paths(&self) -> Vec<PathBuf> {
        [PLAN_FILE, NOTES_FILE, VERSION_FILE]
            .iter()
            .map(|name| self.relative_dir.join(name))
            .collect()
    }

    /// Whether a changed path reported by git belongs to this set.
    pub fn contains(&self, changed: &str) -> bool {
        let changed = Path::new(changed);
        self.relative_paths().iter().any(|p| p.as_path() == changed)
    }

    fn render(&self, plan: &ReleasePlan) -> Result<Vec<(PathBuf, Vec<u8>)>> {
        let dir = self.dir();
        Ok(vec![
            (dir.join(PLAN_FILE), plan_bytes(plan)?),
            (dir.join(NOTES_FILE), render_release_notes(plan).into_bytes()),
            (dir.join(VERSION_FILE), render_version_file(plan).into_bytes()),
        ])
    }

    /// Write every artifact for `plan`. Returns how many files changed.
    pub fn write_all(&self, plan: &ReleasePlan) -> Result<usize> {
        let mut changed = 0;
        for (path, data) in self.render(plan)? {
            if write_if_changed(&path, &data)? {
                changed += 1;
            }
        }
        info!(dir = %self.dir().display(), changed, "release artifacts written");
        Ok(changed)
    }

    /// Fail unless the files on disk are exactly what `plan` renders to.
    pub fn verify(&self, plan: &ReleasePlan) -> Result<()> {
        for (path, expected) in self.render(plan)? {
            match fs::read(&path) {
                Ok(actual) if actual == expected => {}
                Ok(_) => {
                    return Err(ReleaseError::validation(format!(
                        "{} does not match plan {}; re-run prepare",
                        path.display(),
                        plan.id()
                    )))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(ReleaseError::validation(format!(
                        "{} is missing; run prepare first",
                        path.display()
                    )))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// The plan currently written in this set, if any.
    pub fn existing_plan(&self) -> Result<Option<ReleasePlan>> {
        let path = self.plan_path();
        if !path.exists() {
            return Ok(None);
        }
        read_plan(&path).map(Some)
    }

    /// Remove every artifact file. Returns how many existed.
    pub fn delete_all(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.relative_paths() {
            let full = self.root.join(path);
            match fs::remove_file(&full) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(write_error(&full, e)),
            }
        }
        Ok(removed)
    }
}

/// Record every regular file directly inside `dir`, sorted by name.
pub fn scan_build_outputs(dir: &Path) -> Result<Vec<ArtifactRecord>> {
    if !dir.is_dir() {
        return Err(ReleaseError::validation(format!(
            "artifacts directory {} does not exist",
            dir.display()
        )));
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let mut file = fs::File::open(entry.path())?;
        let mut hasher = Sha256::new();
        let size = io::copy(&mut file, &mut hasher)?;
        records.push(ArtifactRecord {
            name: entry.file_name().to_string_lossy().into_owned(),
            size,
            sha256: format!("{:x}", hasher.finalize()),
        });
    }
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}
