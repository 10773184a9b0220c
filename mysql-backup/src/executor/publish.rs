//! Optional publishing of the backup directory to a git remote.
//!
//! Every git failure is logged and swallowed; publishing never changes the
//! exit code of a run.

use super::process::{ToolCommand, ToolOutput};
use crate::config::PublishConfig;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Publishing disabled or the directory is not a repository
    Skipped,
    /// Nothing staged after `git add`
    NoChanges,
    Published,
    Failed,
}

pub struct Publisher<'a> {
    git: &'a Path,
    dir: &'a Path,
    remote: &'a str,
    branch: &'a str,
}

impl<'a> Publisher<'a> {
    pub fn new(git: &'a Path, dir: &'a Path, publish: &'a PublishConfig) -> Self {
        Self {
            git,
            dir,
            remote: &publish.remote,
            branch: &publish.branch,
        }
    }

    /// A `.git` entry (directory or worktree file) marks a repository
    pub fn is_repository(&self) -> bool {
        self.dir.join(".git").exists()
    }

    /// Fetch, fast-forward, commit everything and push.
    pub async fn publish(&self, message: &str) -> PublishOutcome {
        if !self.is_repository() {
            info!("Publish skipped: {} is not a git repository", self.dir.display());
            return PublishOutcome::Skipped;
        }

        info!("Publishing backups to {}/{}", self.remote, self.branch);

        // fetch and pull failures do not stop the publish
        self.git("fetch", &["fetch", self.remote]).await;
        self.git("pull", &["pull", "--ff-only", self.remote, self.branch])
            .await;

        if self.git("add", &["add", "--all", "."]).await.is_none() {
            return PublishOutcome::Failed;
        }

        match self.staged_changes().await {
            Some(false) => {
                info!("Publish: no changes to commit");
                return PublishOutcome::NoChanges;
            }
            Some(true) => {}
            None => return PublishOutcome::Failed,
        }

        if self.git("commit", &["commit", "-m", message]).await.is_none() {
            return PublishOutcome::Failed;
        }

        let refspec = format!("HEAD:{}", self.branch);
        if self.git("push", &["push", self.remote, refspec.as_str()]).await.is_none() {
            return PublishOutcome::Failed;
        }

        info!("Published backups to {}/{}", self.remote, self.branch);
        PublishOutcome::Published
    }

    /// `git diff --cached --quiet`: 0 = clean, 1 = staged changes
    async fn staged_changes(&self) -> Option<bool> {
        match self.command(&["diff", "--cached", "--quiet"]).run().await {
            Ok(output) => match output.status.code() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => {
                    warn!("Publish: git diff failed: {}", output.failure_reason());
                    None
                }
            },
            Err(e) => {
                warn!("Publish: cannot run git diff: {}", e);
                None
            }
        }
    }

    /// Run one git step; `None` (with a warning logged) if it failed
    async fn git(&self, step: &str, args: &[&str]) -> Option<ToolOutput> {
        match self.command(args).run().await {
            Ok(output) if output.success() => Some(output),
            Ok(output) => {
                warn!("Publish: git {} failed: {}", step, output.failure_reason());
                None
            }
            Err(e) => {
                warn!("Publish: cannot run git {}: {}", step, e);
                None
            }
        }
    }

    fn command(&self, args: &[&str]) -> ToolCommand {
        ToolCommand::new("git", self.git)
            .args(args)
            .current_dir(self.dir)
    }
}
