//! Compression of the temporary dump into the final artifact.

use super::process::ToolCommand;
use crate::utils::errors::{BackupError, Result};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

/// Run `gzip -c <source>` into `target`.
///
/// `target` must not exist yet; an existing artifact is never overwritten.
/// On any failure after `target` was created, the partial file is removed.
pub async fn compress(gzip: &Path, source: &Path, target: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => BackupError::Compress(format!(
                "artifact name collision: {} already exists, compressor not run",
                target.display()
            )),
            _ => BackupError::Compress(format!("cannot create {}: {}", target.display(), e)),
        })?;

    let result = run_compressor(gzip, source, &file).await;
    if result.is_err() {
        drop(file);
        remove_partial(target);
    }
    result
}

async fn run_compressor(gzip: &Path, source: &Path, file: &fs::File) -> Result<()> {
    let sink = file
        .try_clone()
        .map_err(|e| BackupError::Compress(e.to_string()))?;

    let output = ToolCommand::new("gzip", gzip)
        .arg("-c")
        .arg(source)
        .stdout(sink)
        .run()
        .await
        .map_err(|e| BackupError::Compress(format!("cannot run {}: {}", gzip.display(), e)))?;

    if !output.success() {
        return Err(BackupError::Compress(format!(
            "{} exited with {}",
            gzip.display(),
            output.failure_reason()
        )));
    }

    file.sync_all()
        .map_err(|e| BackupError::Compress(format!("cannot sync artifact: {}", e)))
}

fn remove_partial(target: &Path) {
    match fs::remove_file(target) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial artifact {}: {}", target.display(), e),
    }
}
