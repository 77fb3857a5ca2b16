//! Wait command - block until cluster DNS resolves through the tunnel.

use anyhow::Result;
use kubetunnel_core::application::{resolve_probe_host, wait_until_ready, ReadinessTimings};

pub async fn run() -> Result<()> {
    let settings = super::load_settings().await?;
    let timings = ReadinessTimings {
        ceiling: settings.readiness_timeout(),
        ..ReadinessTimings::default()
    };

    wait_until_ready(resolve_probe_host, timings).await?;
    Ok(())
}
