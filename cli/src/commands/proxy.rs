//! Proxy command - run the tunnel inside the local proxy container.

use anyhow::{Context, Result};
use kubetunnel_core::{
    ProcessSupervisor, ProxyConfig, ShutdownSignal, SystemRunner, TunnelBootstrapper,
};
use tracing::info;

pub async fn run(config_json: &str) -> Result<()> {
    let proxy = ProxyConfig::from_json(config_json).context("Invalid proxy configuration")?;
    let mut shutdown = ShutdownSignal::register().context("Failed to install signal handlers")?;
    let settings = super::load_settings().await?;

    let runner = SystemRunner::new();
    let supervisor = ProcessSupervisor::new();
    let bootstrapper =
        TunnelBootstrapper::new(&runner, &proxy).with_ssh_wait(settings.ssh_wait_timeout());

    tokio::select! {
        result = bootstrapper.run(&supervisor) => {
            result.context("Tunnel stopped")?;
        }
        () = shutdown.recv() => {
            info!("Stopping the tunnel");
            supervisor.kill_all().await;
        }
    }

    Ok(())
}
