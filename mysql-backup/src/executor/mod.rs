//! Backup runner - Orchestrates one backup run.
//!
//! Steps run strictly in sequence:
//! - Preflight (tools, backup directory)
//! - Single-instance lock
//! - Dump into a temp file
//! - Compress into the timestamped artifact
//! - Checksum sidecar
//! - Rotation of expired artifacts
//! - Optional git publish
//!
//! Dump and compression failures are fatal. Checksum, rotation and publish
//! are best-effort: their failures are logged as warnings only.

pub mod checksum;
pub mod compress;
pub mod dump;
pub mod process;
pub mod publish;

use crate::config::Config;
use crate::daemon::lock::{self, RunLock};
use crate::fs::artifact;
use crate::fs::retention::{self, RotationReport};
use crate::preflight;
use crate::utils::errors::Result;
use chrono::Local;
use publish::{PublishOutcome, Publisher};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{error, info, warn};

/// How a run ended, when it did not fail
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Another run holds the lock; nothing was done
    Skipped { holder: Option<u32> },
}

/// Everything a completed run produced
#[derive(Debug)]
pub struct RunSummary {
    pub artifact: PathBuf,
    pub checksum: Option<PathBuf>,
    pub rotation: Option<RotationReport>,
    pub publish: PublishOutcome,
}

/// Main backup runner
pub struct BackupRunner {
    config: Config,
}

impl BackupRunner {
    /// `config` must already be validated
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Execute one backup run
    pub async fn run(&self) -> Result<RunOutcome> {
        let config = &self.config;
        let backup = &config.backup;
        let backup_dir = config.backup_dir();

        preflight::check_tools(config)?;
        preflight::ensure_dir(&backup_dir)?;

        let lock_path = config.lock_path();
        let Some(_lock) = RunLock::try_acquire(&lock_path)? else {
            let holder = lock::holder_pid(&lock_path);
            match holder {
                Some(pid) => info!(
                    "Another backup of {} is running (pid {}), skipping",
                    backup.project, pid
                ),
                None => info!("Another backup of {} is running, skipping", backup.project),
            }
            return Ok(RunOutcome::Skipped { holder });
        };

        let started = Local::now();
        info!(
            "Starting backup of database {} into {}",
            backup.database,
            backup_dir.display()
        );

        let temp = dump::dump_database(&config.tools.mysqldump, backup, &backup_dir)
            .await
            .inspect_err(|e| error!("{}", e))?;
        info!("Dump written to {}", temp.path().display());

        let artifact = backup_dir.join(artifact::artifact_name(
            &backup.project,
            &backup.extension,
            &started,
        ));
        let compressed = compress::compress(&config.tools.gzip, temp.path(), &artifact).await;

        // The temp dump goes away whatever the compressor did
        if let Err(e) = temp.close() {
            warn!("Failed to remove temporary dump: {}", e);
        }
        compressed.inspect_err(|e| error!("{}", e))?;
        info!("Compressed backup written to {}", artifact.display());

        let checksum = match checksum::write_checksum(&config.tools.sha256sum, &artifact).await {
            Ok(sidecar) => {
                info!("Checksum written to {}", sidecar.display());
                Some(sidecar)
            }
            Err(e) => {
                warn!("Checksum step failed: {:#}", e);
                None
            }
        };

        let rotation = self.rotate(backup_dir.clone()).await;

        let publish = if config.publish.enabled {
            let message = format!(
                "Backup {} {} from {}",
                backup.project,
                started.format(artifact::TIMESTAMP_FORMAT),
                host_name()
            );
            Publisher::new(&config.tools.git, &backup_dir, &config.publish)
                .publish(&message)
                .await
        } else {
            PublishOutcome::Skipped
        };

        info!("Backup completed: {}", artifact.display());
        Ok(RunOutcome::Completed(RunSummary {
            artifact,
            checksum,
            rotation,
            publish,
        }))
    }

    async fn rotate(&self, backup_dir: PathBuf) -> Option<RotationReport> {
        let project = self.config.backup.project.clone();
        let extension = self.config.backup.extension.clone();
        let retention_days = self.config.backup.retention_days;

        info!("Rotating backups older than {} days", retention_days);
        let result = tokio::task::spawn_blocking(move || {
            retention::rotate(&backup_dir, &project, &extension, retention_days, SystemTime::now())
        })
        .await;

        match result {
            Ok(Ok(report)) => {
                info!(
                    "Rotation removed {} file(s), {} backup(s) retained",
                    report.removed.len(),
                    report.retained
                );
                if !report.failed.is_empty() {
                    warn!("Rotation could not remove {} file(s)", report.failed.len());
                }
                Some(report)
            }
            Ok(Err(e)) => {
                warn!("Rotation failed: {}", e);
                None
            }
            Err(e) => {
                warn!("Rotation task failed: {}", e);
                None
            }
        }
    }
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}
