//! Checksum sidecar for a finished artifact.

use super::process::ToolCommand;
use crate::fs::artifact;
use anyhow::{bail, Context};
use std::fs;
use std::path::{Path, PathBuf};

/// Run the hash tool on `artifact` from inside its directory, so the digest
/// line names the bare file (`<hex>  <file name>`), and store the line as
/// the sidecar. Returns the sidecar path.
pub async fn write_checksum(sha256sum: &Path, artifact: &Path) -> anyhow::Result<PathBuf> {
    let dir = artifact
        .parent()
        .context("artifact path has no parent directory")?;
    let name = artifact
        .file_name()
        .context("artifact path has no file name")?;

    let output = ToolCommand::new("sha256sum", sha256sum)
        .arg(name)
        .current_dir(dir)
        .run()
        .await
        .with_context(|| format!("cannot run {}", sha256sum.display()))?;

    if !output.success() {
        bail!("{} exited with {}", sha256sum.display(), output.failure_reason());
    }

    let line = String::from_utf8(output.stdout).context("digest output is not UTF-8")?;
    let digest = line.split_whitespace().next().unwrap_or_default();
    if !is_sha256_hex(digest) {
        bail!("unexpected digest output: {:?}", line.trim());
    }

    let sidecar = artifact::sidecar_path(artifact);
    fs::write(&sidecar, line.as_bytes())
        .with_context(|| format!("cannot write {}", sidecar.display()))?;

    Ok(sidecar)
}

fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit())
}
