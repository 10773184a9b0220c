//! Checks and setup performed before a backup run touches anything.

use crate::config::Config;
use crate::utils::errors::{BackupError, Result};
use nix::sys::stat::{umask, Mode};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::error;

/// Tools the run shells out to, keyed by role. `git` only when publishing.
pub fn required_tools(config: &Config) -> Vec<(&'static str, &Path)> {
    let tools = &config.tools;
    let mut required = vec![
        ("mysqldump", tools.mysqldump.as_path()),
        ("gzip", tools.gzip.as_path()),
        ("sha256sum", tools.sha256sum.as_path()),
    ];
    if config.publish.enabled {
        required.push(("git", tools.git.as_path()));
    }
    required
}

/// Resolve a tool the way a shell would: paths with a separator are used
/// as-is, bare names are searched on `PATH`.
pub fn resolve_tool(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return is_executable(program).then(|| program.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Fail on the first unresolvable tool, logging every missing one
pub fn check_tools(config: &Config) -> Result<()> {
    let missing: Vec<_> = required_tools(config)
        .into_iter()
        .filter(|(_, program)| resolve_tool(program).is_none())
        .collect();

    for (tool, program) in &missing {
        error!("Required tool {} not found: {}", tool, program.display());
    }

    match missing.into_iter().next() {
        Some((tool, program)) => Err(BackupError::MissingTool {
            tool,
            path: program.display().to_string(),
        }),
        None => Ok(()),
    }
}

/// Create a directory (and parents) if absent
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        BackupError::Preflight(format!("cannot create directory {}: {}", path.display(), e))
    })
}

/// Apply the process-wide file creation mask, returning the previous one
pub fn restrict_umask(mask: u32) -> u32 {
    let previous = umask(Mode::from_bits_truncate(mask as nix::libc::mode_t));
    previous.bits() as u32
}
