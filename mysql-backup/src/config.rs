//! Configuration management for the backup runner.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides (`MYSQL_BACKUP__<SECTION>__<KEY>`), then validates it once.

use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "MYSQL_BACKUP";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process-wide file creation mask applied before anything is written
    pub umask: u32,

    pub backup: BackupConfig,
    pub log: LogConfig,
    pub lock: LockConfig,
    pub tools: ToolsConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Project identifier used in artifact, lock and log names
    pub project: String,

    /// Database passed to the dump tool
    pub database: String,

    /// Directory holding artifacts (default: /var/backups/mysql/<project>)
    pub dir: Option<PathBuf>,

    /// Dump file extension before `.gz`
    pub extension: String,

    /// Artifacts older than this many days are rotated out
    pub retention_days: u32,

    /// Options passed verbatim to the dump tool, one argument each
    pub dump_options: Vec<String>,

    /// MySQL option file holding credentials (`--defaults-extra-file`)
    pub credentials_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Append-only log file (default: /var/log/mysql-backup/<project>.log)
    pub path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lock file (default: <tmp>/mysql-backup-<project>.lock)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub mysqldump: PathBuf,
    pub gzip: PathBuf,
    pub sha256sum: PathBuf,
    pub git: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Commit and push the backup directory after each run
    pub enabled: bool,

    /// Git remote name
    pub remote: String,

    /// Remote branch receiving the commits
    pub branch: String,
}

// Default values
fn default_umask() -> u32 {
    0o077
}

fn default_dump_options() -> Vec<String> {
    ["--single-transaction", "--quick", "--routines", "--triggers", "--events"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            umask: default_umask(),
            backup: BackupConfig::default(),
            log: LogConfig::default(),
            lock: LockConfig::default(),
            tools: ToolsConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            project: "mysql".to_string(),
            database: String::new(),
            dir: None,
            extension: "sql".to_string(),
            retention_days: 30,
            dump_options: default_dump_options(),
            credentials_file: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            level: "info".to_string(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mysqldump: PathBuf::from("mysqldump"),
            gzip: PathBuf::from("gzip"),
            sha256sum: PathBuf::from("sha256sum"),
            git: PathBuf::from("git"),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote: "origin".to_string(),
            branch: "main".to_string(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file (if any), then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("backup.dump_options")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Render the resolved configuration as TOML
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every invariant the runner relies on
    pub fn validate(&self) -> Result<()> {
        let backup = &self.backup;

        if backup.project.is_empty() {
            return Err(BackupError::Config("backup.project must not be empty".into()));
        }
        if backup.project.starts_with('.')
            || !backup
                .project
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(BackupError::Config(format!(
                "backup.project {:?} may only contain letters, digits, '.', '_' and '-'",
                backup.project
            )));
        }
        if backup.database.trim().is_empty() {
            return Err(BackupError::Config("backup.database must be set".into()));
        }
        if backup.extension.is_empty()
            || backup.extension.contains('/')
            || backup.extension.starts_with('.')
            || backup.extension.ends_with('.')
        {
            return Err(BackupError::Config(format!(
                "backup.extension {:?} is not a valid file extension",
                backup.extension
            )));
        }
        if backup.retention_days == 0 {
            return Err(BackupError::Config("backup.retention_days must be at least 1".into()));
        }
        if let Some(credentials) = &backup.credentials_file {
            if !credentials.is_file() {
                return Err(BackupError::Config(format!(
                    "backup.credentials_file {} does not exist",
                    credentials.display()
                )));
            }
        }
        if self.umask > 0o777 {
            return Err(BackupError::Config(format!("umask {:o} is out of range", self.umask)));
        }
        if self.publish.enabled
            && (self.publish.remote.trim().is_empty() || self.publish.branch.trim().is_empty())
        {
            return Err(BackupError::Config(
                "publish.remote and publish.branch must be set when publishing".into(),
            ));
        }

        Ok(())
    }

    /// Directory holding artifacts and sidecars
    pub fn backup_dir(&self) -> PathBuf {
        self.backup
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("/var/backups/mysql").join(&self.backup.project))
    }

    /// Append-only log file
    pub fn log_path(&self) -> PathBuf {
        self.log.path.clone().unwrap_or_else(|| {
            PathBuf::from("/var/log/mysql-backup").join(format!("{}.log", self.backup.project))
        })
    }

    /// Lock file guarding concurrent runs of the same project
    pub fn lock_path(&self) -> PathBuf {
        self.lock.path.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("mysql-backup-{}.lock", self.backup.project))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.backup.project = "demo".to_string();
        config.backup.database = "demo_db".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = BackupConfig::default();
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.extension, "sql");
        assert!(config.dump_options.contains(&"--single-transaction".to_string()));

        let publish = PublishConfig::default();
        assert!(!publish.enabled);
        assert_eq!(publish.remote, "origin");
    }

    #[test]
    fn test_derived_paths() {
        let config = valid_config();
        assert_eq!(config.backup_dir(), PathBuf::from("/var/backups/mysql/demo"));
        assert_eq!(config.log_path(), PathBuf::from("/var/log/mysql-backup/demo.log"));
        assert!(config.lock_path().ends_with("mysql-backup-demo.lock"));
    }

    #[test]
    fn test_validate_accepts_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = valid_config();
        config.backup.project = "../etc".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.backup.database = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.backup.retention_days = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.backup.extension = ".sql".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.publish.enabled = true;
        config.publish.branch = String::new();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.backup.credentials_file = Some(PathBuf::from("/nonexistent/my.cnf"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml_sections() -> anyhow::Result<()> {
        let config: Config = toml::from_str(
            r#"
            umask = 0o027

            [backup]
            project = "demo"
            database = "shop"
            retention_days = 7
            dump_options = ["--quick"]

            [publish]
            enabled = true
            branch = "backups"
            "#,
        )?;

        assert_eq!(config.umask, 0o027);
        assert_eq!(config.backup.retention_days, 7);
        assert_eq!(config.backup.dump_options, vec!["--quick".to_string()]);
        assert_eq!(config.backup.extension, "sql");
        assert!(config.publish.enabled);
        assert_eq!(config.publish.remote, "origin");
        assert_eq!(config.publish.branch, "backups");
        assert_eq!(config.tools.gzip, PathBuf::from("gzip"));
        Ok(())
    }

    #[test]
    fn test_load_file_with_env_override() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("backup.toml");
        fs::write(
            &path,
            "[backup]\nproject = \"demo\"\ndatabase = \"shop\"\nretention_days = 7\n",
        )?;

        std::env::set_var("MYSQL_BACKUP__BACKUP__RETENTION_DAYS", "14");
        let loaded = Config::load(Some(&path));
        std::env::remove_var("MYSQL_BACKUP__BACKUP__RETENTION_DAYS");
        let config = loaded?;

        assert_eq!(config.backup.project, "demo");
        assert_eq!(config.backup.database, "shop");
        assert_eq!(config.backup.retention_days, 14);
        assert_eq!(config.umask, 0o077);
        assert!(config.validate().is_ok());

        let rendered = config.to_toml()?;
        assert!(rendered.contains("retention_days = 14"));
        Ok(())
    }
}
