//! Readiness probe run in the proxy's network namespace.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::net::lookup_host;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Error, Result};

/// Name that only resolves once cluster DNS is reachable through the tunnel.
pub const PROBE_HOST: &str = "kubernetes.default";

/// Exit code signalling a live tunnel to whoever launched the probe.
pub const READY_EXIT_CODE: i32 = 100;

/// Probe timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessTimings {
    /// Give up after this long.
    pub ceiling: Duration,
    /// Pause between failed lookups.
    pub interval: Duration,
    /// Pause after the first successful lookup.
    pub settle: Duration,
}

impl Default for ReadinessTimings {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(30),
            interval: Duration::from_millis(100),
            settle: Duration::from_secs(1),
        }
    }
}

/// Poll `resolve` until it succeeds or the ceiling passes.
pub async fn wait_until_ready<F, Fut>(mut resolve: F, timings: ReadinessTimings) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let start = Instant::now();
    while start.elapsed() < timings.ceiling {
        match resolve().await {
            Ok(()) => {
                sleep(timings.settle).await;
                return Ok(());
            }
            Err(e) => {
                debug!(error = %e, "Cluster DNS not reachable yet");
                sleep(timings.interval).await;
            }
        }
    }
    Err(Error::Connectivity(
        "Failed to connect to proxy in remote cluster.".to_string(),
    ))
}

/// Resolve [`PROBE_HOST`] with the system resolver.
pub async fn resolve_probe_host() -> io::Result<()> {
    lookup_host((PROBE_HOST, 443)).await?.next().map(|_| ()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("{} has no addresses", PROBE_HOST))
    })
}
