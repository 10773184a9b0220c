//! External tool invocation.
//!
//! Arguments are always passed as a vector, never through a shell. Children
//! are killed if the future driving them is dropped (signal cancellation).

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Captured result of one tool invocation
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit status plus the last stderr line, for log messages
    pub fn failure_reason(&self) -> String {
        match self.stderr.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(line) => format!("{}: {}", self.status, line.trim()),
            None => self.status.to_string(),
        }
    }
}

/// A single external command about to be run
pub struct ToolCommand {
    name: &'static str,
    program: PathBuf,
    command: Command,
}

impl ToolCommand {
    pub fn new(name: &'static str, program: &Path) -> Self {
        let mut command = Command::new(program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Self {
            name,
            program: program.to_path_buf(),
            command,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.command.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command.args(args);
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.command.current_dir(dir);
        self
    }

    /// Send standard output somewhere other than the capture buffer
    pub fn stdout(mut self, stdout: impl Into<Stdio>) -> Self {
        self.command.stdout(stdout);
        self
    }

    /// Run to completion, capturing stderr (and stdout unless redirected)
    pub async fn run(mut self) -> io::Result<ToolOutput> {
        debug!(
            "Running {}: {} {:?}",
            self.name,
            self.program.display(),
            self.command.as_std().get_args().collect::<Vec<_>>()
        );

        let output = self.command.output().await?;

        debug!("{} exited with {}", self.name, output.status);
        Ok(ToolOutput {
            status: output.status,
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
