//! Single-instance guard for backup runs.
//!
//! A run holds `flock(LOCK_EX | LOCK_NB)` on the project's lock file for its
//! whole lifetime. The guard removes the file and releases the lock when
//! dropped, which covers normal completion, failures and signal
//! cancellation alike. A process that dies outright is released by the OS.

use crate::utils::errors::{BackupError, Result};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive advisory lock held for the duration of one backup run
pub struct RunLock {
    path: PathBuf,
    _guard: Flock<File>,
}

/// Attempts before giving up on a lock file that keeps being replaced
const MAX_ATTEMPTS: usize = 3;

/// Result of locking one opened handle of the lock file
enum Attempt {
    Held(Flock<File>),
    Busy,
    /// The path was removed or replaced after the handle was opened
    Stale,
}

impl RunLock {
    /// Try to take the lock without waiting.
    ///
    /// Returns `Ok(None)` when another process already holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        for _ in 0..MAX_ATTEMPTS {
            let file = open_lock_file(path)?;
            match lock_opened(path, file)? {
                Attempt::Held(guard) => return Self::record(path, guard).map(Some),
                Attempt::Busy => return Ok(None),
                Attempt::Stale => debug!("Lock file {} was replaced, retrying", path.display()),
            }
        }

        Ok(None)
    }

    fn record(path: &Path, guard: Flock<File>) -> Result<Self> {
        // Record the holder so a skipped run can say who it yielded to
        let mut handle: &File = &guard;
        handle.set_len(0)?;
        writeln!(handle, "{}", std::process::id())?;

        debug!("Acquired lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            _guard: guard,
        })
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| BackupError::Lock {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Lock an already opened handle, then make sure it still is the file at
/// `path`. The holder unlinks the file before releasing the lock, so a
/// handle opened earlier can lock an inode nobody else will ever look at.
fn lock_opened(path: &Path, file: File) -> Result<Attempt> {
    let guard = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
        Ok(guard) => guard,
        Err((_, errno)) if errno == Errno::EWOULDBLOCK => return Ok(Attempt::Busy),
        Err((_, errno)) => {
            return Err(BackupError::Lock {
                path: path.to_path_buf(),
                reason: errno.desc().to_string(),
            })
        }
    };

    let locked = guard.metadata()?;
    match fs::metadata(path) {
        Ok(current) if current.dev() == locked.dev() && current.ino() == locked.ino() => {
            Ok(Attempt::Held(guard))
        }
        Ok(_) => Ok(Attempt::Stale),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Attempt::Stale),
        Err(e) => Err(e.into()),
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Released lock {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove lock file {}: {}", self.path.display(), e),
        }
    }
}

/// PID recorded in a lock file, if readable
pub fn holder_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_refused() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("demo.lock");

        let first = RunLock::try_acquire(&path)?;
        assert!(first.is_some());

        let second = RunLock::try_acquire(&path)?;
        assert!(second.is_none());

        Ok(())
    }

    #[test]
    fn test_drop_releases_and_removes_file() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("locks/demo.lock");

        let lock = RunLock::try_acquire(&path)?.expect("lock should be free");
        assert!(path.exists());
        assert_eq!(holder_pid(&path), Some(std::process::id()));

        drop(lock);
        assert!(!path.exists());

        let again = RunLock::try_acquire(&path)?;
        assert!(again.is_some());
        Ok(())
    }

    #[test]
    fn test_stale_lock_file_is_reused() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("demo.lock");

        // Left behind by a process that died without cleaning up
        fs::write(&path, "99999\n")?;

        let lock = RunLock::try_acquire(&path)?;
        assert!(lock.is_some());
        assert_eq!(holder_pid(&path), Some(std::process::id()));
        Ok(())
    }

    #[test]
    fn test_handle_opened_before_release_cannot_lock() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("demo.lock");

        let first = RunLock::try_acquire(&path)?.expect("lock should be free");
        let early = File::open(&path)?;
        drop(first);

        let next = RunLock::try_acquire(&path)?;
        assert!(next.is_some());

        // the early handle refers to the unlinked file, not the live lock
        assert!(matches!(lock_opened(&path, early)?, Attempt::Stale));
        assert_eq!(holder_pid(&path), Some(std::process::id()));
        Ok(())
    }

    #[test]
    fn test_handle_to_removed_file_is_stale() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("demo.lock");

        let first = RunLock::try_acquire(&path)?.expect("lock should be free");
        let early = File::open(&path)?;
        drop(first);

        assert!(matches!(lock_opened(&path, early)?, Attempt::Stale));
        assert!(!path.exists());
        Ok(())
    }
}
