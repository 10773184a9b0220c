//! SIGINT / SIGTERM handling for a backup run.
//!
//! Handlers are installed before the run starts. When a signal arrives the
//! run future is dropped, which kills the running child process and releases
//! the lock through the same guards as a normal exit.

use std::io;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;

/// A termination request received while a run was in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Interrupt,
    Terminate,
}

impl Interruption {
    /// Shell convention: 128 + signal number
    pub fn exit_code(self) -> u8 {
        match self {
            Interruption::Interrupt => 128 + 2,
            Interruption::Terminate => 128 + 15,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Interruption::Interrupt => "SIGINT",
            Interruption::Terminate => "SIGTERM",
        }
    }
}

/// Installed signal handlers
pub struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    /// Register handlers for SIGINT and SIGTERM
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the next SIGINT or SIGTERM
    pub async fn recv(&mut self) -> Interruption {
        let received = tokio::select! {
            _ = self.interrupt.recv() => Interruption::Interrupt,
            _ = self.terminate.recv() => Interruption::Terminate,
        };
        info!("Received {}, stopping backup run", received.name());
        received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Interruption::Interrupt.exit_code(), 130);
        assert_eq!(Interruption::Terminate.exit_code(), 143);
    }

    #[tokio::test]
    async fn test_terminate_is_observed() -> anyhow::Result<()> {
        let mut signals = ShutdownSignals::install()?;

        nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM)?;

        let received = tokio::time::timeout(Duration::from_secs(5), signals.recv()).await?;
        assert_eq!(received, Interruption::Terminate);
        Ok(())
    }
}
