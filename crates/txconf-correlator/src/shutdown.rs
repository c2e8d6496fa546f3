use std::fmt;

use tokio::sync::watch;
use tracing::info;

use crate::error::{CorrelatorError, CorrelatorResult};

/// Lifecycle of a correlator service.
///
/// Transitions only move forward: `Running -> Stopping -> Draining -> Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    /// Workers are consuming streams and resolving records.
    Running,
    /// Stop has been broadcast; waiting for every worker to exit.
    Stopping,
    /// Workers are gone; remaining pending records are being flushed.
    Draining,
    /// Output is closed and, if configured, rotated.
    Stopped,
}

impl ShutdownState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishes [`ShutdownState`] transitions to any number of observers.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: watch::Sender<ShutdownState>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self { state }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Move forward to `next`. Returns `false` if already at or past it.
    pub fn advance(&self, next: ShutdownState) -> bool {
        let advanced = self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if advanced {
            info!(state = %next, "shutdown state changed");
        }
        advanced
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGINT or, on Unix, SIGTERM.
///
/// Failing to install a handler is fatal.
pub async fn shutdown_signal() -> CorrelatorResult<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate()).map_err(CorrelatorError::Signal)?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.map_err(CorrelatorError::Signal)?;
                info!("received SIGINT");
            }
            _ = terminate.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(CorrelatorError::Signal)?;
        info!("received Ctrl+C");
    }

    Ok(())
}
