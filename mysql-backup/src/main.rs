//! MySQL backup runner - Main entry point
//!
//! One invocation performs one backup run; schedule it with cron or a
//! systemd timer.

use clap::Parser;
use mysql_backup::daemon::shutdown::ShutdownSignals;
use mysql_backup::{preflight, utils, BackupError, BackupRunner, Config, RunOutcome};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mysql-backup: cannot load configuration: {:#}", e);
            return ExitCode::from(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("mysql-backup: {}", e);
        return ExitCode::from(e.exit_code());
    }

    if args.print_config {
        return match config.to_toml() {
            Ok(rendered) => {
                print!("{}", rendered);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("mysql-backup: {:#}", e);
                ExitCode::from(1)
            }
        };
    }

    preflight::restrict_umask(config.umask);

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    if let Err(e) = utils::logger::init(&config.log_path(), log_level) {
        eprintln!(
            "mysql-backup: cannot open log file {}: {:#}",
            config.log_path().display(),
            e
        );
        return ExitCode::from(1);
    }

    let mut signals = match ShutdownSignals::install() {
        Ok(signals) => signals,
        Err(e) => {
            tracing::error!("Failed to install signal handlers: {}", e);
            tracing::info!("Exiting with code 1");
            return ExitCode::from(1);
        }
    };

    tracing::info!(
        "Starting mysql-backup v{} (project: {})",
        env!("CARGO_PKG_VERSION"),
        config.backup.project
    );

    let runner = BackupRunner::new(config);

    // Both branches drop the run future (and with it the lock guard and any
    // running child) before the final line is logged.
    let code = tokio::select! {
        result = runner.run() => match result {
            Ok(RunOutcome::Completed(_)) | Ok(RunOutcome::Skipped { .. }) => 0,
            Err(e) => {
                tracing::error!("Backup failed: {}", e);
                if let BackupError::MissingTool { .. } = e {
                    eprintln!("mysql-backup: {}", e);
                }
                e.exit_code()
            }
        },
        interruption = signals.recv() => interruption.exit_code(),
    };

    tracing::info!("Exiting with code {}", code);
    ExitCode::from(code)
}
