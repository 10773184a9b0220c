//! Age-based rotation of backup artifacts.
//!
//! Only the top level of the backup directory is scanned, and only files
//! matching this project's artifact or sidecar pattern are candidates.
//! Deletion is best-effort: failures are reported, never fatal.

use super::artifact::{self, ArtifactKind};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use walkdir::WalkDir;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Outcome of one rotation pass
#[derive(Debug, Default)]
pub struct RotationReport {
    /// Files deleted (artifacts and sidecars)
    pub removed: Vec<PathBuf>,

    /// Files that should have been deleted but could not be
    pub failed: Vec<(PathBuf, String)>,

    /// Artifacts still inside the retention window
    pub retained: usize,
}

impl RotationReport {
    fn remove(&mut self, path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Removed expired backup file: {}", path.display());
                self.removed.push(path.to_path_buf());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove expired file {}: {}", path.display(), e);
                self.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }
}

/// Retention window as a duration
pub fn retention_window(retention_days: u32) -> Duration {
    Duration::from_secs(u64::from(retention_days) * SECONDS_PER_DAY)
}

/// A file is expired when its age is strictly greater than the window.
/// Files dated in the future are never expired.
pub fn is_expired(modified: SystemTime, now: SystemTime, window: Duration) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age > window,
        Err(_) => false,
    }
}

/// Delete this project's artifacts older than `retention_days`, together
/// with their sidecars. Orphaned sidecars past the window go too.
///
/// Only an unreadable `dir` is an error; a bad entry is logged and skipped.
pub fn rotate(
    dir: &Path,
    project: &str,
    extension: &str,
    retention_days: u32,
    now: SystemTime,
) -> io::Result<RotationReport> {
    let candidates = scan(dir, project, extension)?;
    Ok(rotate_candidates(candidates, now, retention_window(retention_days)))
}

/// This project's artifacts and sidecars directly inside `dir`
fn scan(dir: &Path, project: &str, extension: &str) -> io::Result<Vec<(PathBuf, ArtifactKind)>> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 || e.path() == Some(dir) => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if let Some(kind) = artifact::classify(project, extension, name) {
            candidates.push((entry.into_path(), kind));
        }
    }

    Ok(candidates)
}

fn rotate_candidates(
    candidates: Vec<(PathBuf, ArtifactKind)>,
    now: SystemTime,
    window: Duration,
) -> RotationReport {
    let mut report = RotationReport::default();
    let mut kept_artifacts = HashSet::new();
    let mut sidecars = Vec::new();

    for (path, kind) in candidates {
        let modified = match std::fs::symlink_metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        match kind {
            ArtifactKind::Artifact if is_expired(modified, now, window) => {
                report.remove(&path);
                report.remove(&artifact::sidecar_path(&path));
            }
            ArtifactKind::Artifact => {
                report.retained += 1;
                kept_artifacts.insert(path);
            }
            ArtifactKind::Sidecar => sidecars.push((path, modified)),
        }
    }

    for (sidecar, modified) in sidecars {
        let owner = sidecar.with_extension("");
        if kept_artifacts.contains(&owner) || owner.exists() {
            continue;
        }
        if is_expired(modified, now, window) {
            report.remove(&sidecar);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(SECONDS_PER_DAY);

    fn touch(path: &Path, modified: SystemTime) -> io::Result<()> {
        fs::write(path, b"data")?;
        File::options().write(true).open(path)?.set_modified(modified)
    }

    #[test]
    fn test_is_expired_boundary() {
        let now = SystemTime::now();
        let window = retention_window(30);

        assert!(is_expired(now - 31 * DAY, now, window));
        assert!(is_expired(now - 30 * DAY - Duration::from_secs(1), now, window));
        assert!(!is_expired(now - 30 * DAY, now, window));
        assert!(!is_expired(now - 5 * DAY, now, window));
        assert!(!is_expired(now + DAY, now, window));
    }

    #[test]
    fn test_rotate_removes_expired_pairs() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path();
        let now = SystemTime::now();

        let old = dir.join("demo_20230101000000.sql.gz");
        let fresh = dir.join("demo_20230201000000.sql.gz");
        touch(&old, now - 40 * DAY)?;
        touch(&artifact::sidecar_path(&old), now - 40 * DAY)?;
        touch(&fresh, now - 5 * DAY)?;
        touch(&artifact::sidecar_path(&fresh), now - 5 * DAY)?;

        let report = rotate(dir, "demo", "sql", 30, now)?;

        assert_eq!(report.removed.len(), 2);
        assert_eq!(report.retained, 1);
        assert!(report.failed.is_empty());
        assert!(!old.exists());
        assert!(!artifact::sidecar_path(&old).exists());
        assert!(fresh.exists());
        assert!(artifact::sidecar_path(&fresh).exists());
        Ok(())
    }

    #[test]
    fn test_rotate_ignores_foreign_files() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path();
        let now = SystemTime::now();

        let foreign = [
            dir.join("other_20230101000000.sql.gz"),
            dir.join("notes.txt"),
            dir.join(".demo_abc.sql.partial"),
        ];
        for path in &foreign {
            touch(path, now - 400 * DAY)?;
        }
        fs::create_dir(dir.join("demo_20230101000000.sql.gz.d"))?;

        let report = rotate(dir, "demo", "sql", 30, now)?;

        assert!(report.removed.is_empty());
        for path in &foreign {
            assert!(path.exists());
        }
        Ok(())
    }

    #[test]
    fn test_rotate_is_idempotent() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path();
        let now = SystemTime::now();

        touch(&dir.join("demo_20230101000000.sql.gz"), now - 40 * DAY)?;
        touch(&dir.join("demo_20230301000000.sql.gz"), now - DAY)?;

        let first = rotate(dir, "demo", "sql", 30, now)?;
        assert_eq!(first.removed.len(), 1);

        let second = rotate(dir, "demo", "sql", 30, now)?;
        assert!(second.removed.is_empty());
        assert_eq!(second.retained, 1);
        Ok(())
    }

    #[test]
    fn test_rotate_removes_expired_orphan_sidecar() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path();
        let now = SystemTime::now();

        let orphan = dir.join("demo_20220101000000.sql.gz.sha256");
        let recent_orphan = dir.join("demo_20230301000000.sql.gz.sha256");
        touch(&orphan, now - 60 * DAY)?;
        touch(&recent_orphan, now - DAY)?;

        let report = rotate(dir, "demo", "sql", 30, now)?;

        assert_eq!(report.removed, vec![orphan.clone()]);
        assert!(!orphan.exists());
        assert!(recent_orphan.exists());
        Ok(())
    }

    #[test]
    fn test_rotate_missing_directory_is_an_error() {
        let result = rotate(Path::new("/nonexistent/backups"), "demo", "sql", 30, SystemTime::now());
        assert!(result.is_err());
    }

    #[test]
    fn test_vanished_entry_does_not_stop_rotation() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path();
        let now = SystemTime::now();

        let vanished = dir.join("demo_20220101000000.sql.gz");
        let old = dir.join("demo_20230101000000.sql.gz");
        touch(&old, now - 40 * DAY)?;

        let candidates = vec![
            (vanished, ArtifactKind::Artifact),
            (old.clone(), ArtifactKind::Artifact),
        ];
        let report = rotate_candidates(candidates, now, retention_window(30));

        assert_eq!(report.removed, vec![old.clone()]);
        assert!(report.failed.is_empty());
        assert!(!old.exists());
        Ok(())
    }
}
