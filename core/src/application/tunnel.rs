//! Tunnel bootstrap inside the local proxy container.
//!
//! The order is fixed: sshd, then SSH to the cluster, then the exclusion
//! list, then the VPN router, then the SSH port exposures, and finally
//! supervision until something exits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::adapters::{
    ConnectionScanner, ProcessSupervisor, SshClient, DEFAULT_SSH_PORT, SSH_USER,
};
use crate::domain::{ExclusionList, PortExposure};
use crate::error::{Error, Result};
use crate::ports::{CommandRunner, CommandSpec};

/// Local SSH daemon started before anything else.
const SSHD_PATH: &str = "/usr/sbin/sshd";

/// The packet-forwarding engine.
const ROUTER_PROGRAM: &str = "sshuttle-telepresence";

/// Supervisor name of the `ssh -N` port forwarder.
const FORWARDER_NAME: &str = "ssh";

/// Default time allowed for SSH to the cluster to come up.
pub const DEFAULT_SSH_WAIT: Duration = Duration::from_secs(30);

/// Parameters of `proxy` mode, passed as one JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Port the cluster's SSH server is reachable on.
    pub port: u16,
    /// Address of that SSH server; loopback when absent.
    pub ip: Option<String>,
    /// CIDRs routed through the tunnel, in addition to `include_cidrs`.
    pub cidrs: Vec<String>,
    pub include_cidrs: Vec<String>,
    pub exclude_cidrs: Vec<String>,
    /// `[local, remote]` pairs exposed from this machine to the cluster.
    pub expose_ports: Vec<(u16, u16)>,
    pub to_pod: Vec<u16>,
    pub from_pod: Vec<u16>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SSH_PORT,
            ip: None,
            cidrs: Vec::new(),
            include_cidrs: Vec::new(),
            exclude_cidrs: Vec::new(),
            expose_ports: Vec::new(),
            to_pod: Vec::new(),
            from_pod: Vec::new(),
        }
    }
}

impl ProxyConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn ssh_client(&self) -> SshClient {
        let host = self.ip.as_deref().unwrap_or("127.0.0.1");
        SshClient::new(self.port, format!("{}@{}", SSH_USER, host))
    }

    pub fn exposure(&self) -> Result<PortExposure> {
        let mut exposure = PortExposure::new();
        for &(local, remote) in &self.expose_ports {
            if local == 0 || remote == 0 {
                return Err(Error::InvalidPort(format!("{}:{}", local, remote)));
            }
            exposure.expose(local, remote);
        }
        for &port in &self.to_pod {
            exposure.add_to_pod(port);
        }
        for &port in &self.from_pod {
            exposure.add_from_pod(port);
        }
        Ok(exposure)
    }

    /// CIDRs to route, de-duplicated in order.
    pub fn inclusions(&self) -> Vec<String> {
        let mut inclusions: Vec<String> = Vec::new();
        for cidr in self.include_cidrs.iter().chain(&self.cidrs) {
            if !inclusions.contains(cidr) {
                inclusions.push(cidr.clone());
            }
        }
        inclusions
    }
}

/// Background commands ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelPlan {
    pub router: CommandSpec,
    /// Absent when nothing is exposed.
    pub forwarder: Option<CommandSpec>,
}

pub struct TunnelBootstrapper<'a, R> {
    runner: &'a R,
    config: &'a ProxyConfig,
    ssh: SshClient,
    ssh_wait: Duration,
}

impl<'a, R: CommandRunner> TunnelBootstrapper<'a, R> {
    pub fn new(runner: &'a R, config: &'a ProxyConfig) -> Self {
        Self {
            runner,
            config,
            ssh: config.ssh_client(),
            ssh_wait: DEFAULT_SSH_WAIT,
        }
    }

    pub fn with_ssh_wait(mut self, ssh_wait: Duration) -> Self {
        self.ssh_wait = ssh_wait;
        self
    }

    /// Run the synchronous steps and build the background commands.
    pub async fn prepare(&self) -> Result<TunnelPlan> {
        let exposure = self.config.exposure()?;

        self.runner
            .check_call(&CommandSpec::new(SSHD_PATH).arg("-e"))
            .await?;

        self.ssh.wait(self.runner, self.ssh_wait).await.map_err(|_| {
            Error::Connectivity("SSH from local container to the cluster failed to start.".into())
        })?;

        let exclusions = self.exclusions().await?;
        info!(count = exclusions.len(), "Excluding addresses from the tunnel");

        Ok(TunnelPlan {
            router: self.router_command(&exclusions),
            forwarder: self.forwarder_command(&exposure),
        })
    }

    /// Declared exclusions plus both ends of every established connection.
    pub async fn exclusions(&self) -> Result<ExclusionList> {
        let mut exclusions = ExclusionList::new();
        exclusions.extend(self.config.exclude_cidrs.iter().cloned());

        let table = ConnectionScanner::new(self.runner).scan().await?;
        exclusions.extend(table.endpoints().iter().cloned());

        if exclusions.is_empty() {
            return Err(Error::Scan(format!(
                "no addresses to exclude; connection table was:\n{}",
                table.raw()
            )));
        }
        Ok(exclusions)
    }

    pub fn router_command(&self, exclusions: &ExclusionList) -> CommandSpec {
        CommandSpec::new(ROUTER_PROGRAM)
            .args(["-v", "--dns", "--method", "nat", "-e"])
            .arg(format!("ssh {}", self.ssh.required_args().join(" ")))
            .arg("-r")
            .arg(format!("{}:{}", self.ssh.user_at_host, self.ssh.port))
            .args(exclusions.router_args())
            .args(self.config.inclusions())
    }

    pub fn forwarder_command(&self, exposure: &PortExposure) -> Option<CommandSpec> {
        if exposure.is_empty() {
            return None;
        }
        Some(self.ssh.bg_command(exposure.ssh_forward_args()))
    }

    /// Bootstrap the tunnel and supervise it until every process exits.
    #[instrument(skip(self, supervisor), fields(ssh = %self.ssh.user_at_host))]
    pub async fn run(&self, supervisor: &ProcessSupervisor) -> Result<()> {
        let plan = self.prepare().await?;
        self.supervise(&plan, supervisor).await
    }

    /// Launch the router, then the forwarder, and wait on both. A forwarder
    /// that cannot start takes the router down with it.
    pub async fn supervise(&self, plan: &TunnelPlan, supervisor: &ProcessSupervisor) -> Result<()> {
        supervisor.launch(ROUTER_PROGRAM, &plan.router)?;
        if let Some(forwarder) = &plan.forwarder {
            if let Err(e) = supervisor.launch(FORWARDER_NAME, forwarder) {
                supervisor.kill_all().await;
                return Err(e);
            }
        }

        supervisor.wait_all().await
    }
}
