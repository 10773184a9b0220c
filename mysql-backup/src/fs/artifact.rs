//! Naming conventions for backup artifacts and their checksum sidecars.
//!
//! Artifact: `<project>_<YYYYMMDDHHMMSS>.<ext>.gz`
//! Sidecar:  `<artifact>.sha256`

use chrono::{DateTime, TimeZone};
use std::ffi::OsString;
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Timestamp embedded in artifact names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Suffix appended to an artifact name to form its sidecar
pub const CHECKSUM_SUFFIX: &str = ".sha256";

const TIMESTAMP_LEN: usize = 14;

/// What a directory entry is, as far as rotation is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Artifact,
    Sidecar,
}

/// File name of the artifact produced at `timestamp`
pub fn artifact_name<Tz>(project: &str, extension: &str, timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{}_{}.{}.gz", project, timestamp.format(TIMESTAMP_FORMAT), extension)
}

/// Sidecar path for an artifact
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = OsString::from(artifact.as_os_str());
    name.push(CHECKSUM_SUFFIX);
    PathBuf::from(name)
}

/// Prefix of temporary dump files; the leading dot keeps them out of the
/// artifact pattern.
pub fn temp_prefix(project: &str) -> String {
    format!(".{}_", project)
}

/// Classify a file name produced by this project, or `None` for anything else
pub fn classify(project: &str, extension: &str, file_name: &str) -> Option<ArtifactKind> {
    if let Some(base) = file_name.strip_suffix(CHECKSUM_SUFFIX) {
        return is_artifact(project, extension, base).then_some(ArtifactKind::Sidecar);
    }
    is_artifact(project, extension, file_name).then_some(ArtifactKind::Artifact)
}

/// Whether `file_name` is exactly an artifact name for this project
pub fn is_artifact(project: &str, extension: &str, file_name: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(project)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    let Some(stamp) = rest
        .strip_suffix(".gz")
        .and_then(|rest| rest.strip_suffix(extension))
        .and_then(|rest| rest.strip_suffix('.'))
    else {
        return false;
    };

    stamp.len() == TIMESTAMP_LEN && stamp.bytes().all(|b| b.is_ascii_digit())
}
