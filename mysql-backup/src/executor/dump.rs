//! Database dump into a temporary file inside the backup directory.

use super::process::ToolCommand;
use crate::config::BackupConfig;
use crate::fs::artifact;
use crate::utils::errors::{BackupError, Result};
use std::ffi::OsString;
use std::path::Path;
use tempfile::NamedTempFile;

/// Arguments for the dump tool: credentials file first (mysqldump requires
/// it), then the configured options, then the database.
pub fn dump_args(backup: &BackupConfig) -> Vec<OsString> {
    let mut args = Vec::with_capacity(backup.dump_options.len() + 2);

    if let Some(credentials) = &backup.credentials_file {
        let mut arg = OsString::from("--defaults-extra-file=");
        arg.push(credentials);
        args.push(arg);
    }
    args.extend(backup.dump_options.iter().map(OsString::from));
    args.push(OsString::from(&backup.database));
    args
}

/// Run the dump tool with stdout redirected into a fresh temp file.
///
/// The temp file is deleted when the returned handle is dropped, so every
/// failure path (including this one) leaves nothing behind.
pub async fn dump_database(
    mysqldump: &Path,
    backup: &BackupConfig,
    dir: &Path,
) -> Result<NamedTempFile> {
    let temp = tempfile::Builder::new()
        .prefix(&artifact::temp_prefix(&backup.project))
        .suffix(&format!(".{}.partial", backup.extension))
        .tempfile_in(dir)
        .map_err(|e| {
            BackupError::Dump(format!("cannot create temp file in {}: {}", dir.display(), e))
        })?;

    let sink = temp
        .reopen()
        .map_err(|e| BackupError::Dump(format!("cannot open {}: {}", temp.path().display(), e)))?;

    let output = ToolCommand::new("mysqldump", mysqldump)
        .args(dump_args(backup))
        .stdout(sink)
        .run()
        .await
        .map_err(|e| BackupError::Dump(format!("cannot run {}: {}", mysqldump.display(), e)))?;

    if !output.success() {
        return Err(BackupError::Dump(format!(
            "{} exited with {}",
            mysqldump.display(),
            output.failure_reason()
        )));
    }

    Ok(temp)
}
