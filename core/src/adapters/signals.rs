//! Termination signals turned into an awaitable event.
//!
//! Handlers replace the default disposition as soon as they are registered,
//! so a SIGINT or SIGTERM arriving later no longer kills the process and the
//! caller decides how to wind down.

use tracing::info;

use crate::error::Result;

/// SIGINT and SIGTERM (Ctrl-C elsewhere), registered up front.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    #[cfg(unix)]
    pub fn register() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn register() -> Result<Self> {
        Ok(Self {})
    }

    /// Resolve on the next termination signal.
    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("Received SIGINT"),
            _ = self.terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
        }
    }
}
