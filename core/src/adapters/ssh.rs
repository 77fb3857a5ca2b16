//! SSH client invocations against the proxy pod.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{Error, Result};
use crate::ports::{CommandRunner, CommandSpec};

/// Port the proxy's SSH server listens on, forwarded to localhost.
pub const DEFAULT_SSH_PORT: u16 = 38023;

/// Account the proxy's SSH server accepts.
pub const SSH_USER: &str = "telepresence";

/// Login used for the proxy's SSH server.
pub const DEFAULT_SSH_TARGET: &str = "telepresence@127.0.0.1";

const WAIT_INTERVAL: Duration = Duration::from_millis(250);

/// Builds `ssh` command lines for one SSH endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshClient {
    pub port: u16,
    pub user_at_host: String,
}

impl Default for SshClient {
    fn default() -> Self {
        Self::new(DEFAULT_SSH_PORT, DEFAULT_SSH_TARGET)
    }
}

impl SshClient {
    pub fn new(port: u16, user_at_host: impl Into<String>) -> Self {
        Self {
            port,
            user_at_host: user_at_host.into(),
        }
    }

    /// Options every invocation needs: no config file, no host key checks.
    pub fn required_args(&self) -> Vec<String> {
        vec![
            "-F".to_string(),
            "/dev/null".to_string(),
            "-oStrictHostKeyChecking=no".to_string(),
            "-oUserKnownHostsFile=/dev/null".to_string(),
            "-q".to_string(),
            "-p".to_string(),
            self.port.to_string(),
        ]
    }

    /// `ssh` running `extra` on the remote side, with keepalives.
    pub fn command<I, S>(&self, extra: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("ssh")
            .args(["-oServerAliveInterval=1", "-oServerAliveCountMax=10"])
            .args(self.required_args())
            .arg(&self.user_at_host)
            .args(extra)
    }

    /// `ssh -N` for port forwarding only.
    pub fn bg_command<I, S>(&self, forwards: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("ssh")
            .arg("-N")
            .args(["-oServerAliveInterval=1", "-oServerAliveCountMax=10"])
            .args(self.required_args())
            .args(forwards)
            .arg(&self.user_at_host)
    }

    /// Poll until a trivial remote command succeeds or `limit` passes.
    ///
    /// Each attempt only gets the time left before the deadline.
    pub async fn wait<R: CommandRunner>(&self, runner: &R, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        let probe = self.command(["/bin/true"]);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match runner.check_call(&probe.clone().timeout(remaining)).await {
                Ok(()) => return Ok(()),
                Err(e) => debug!(error = %e, "SSH not ready yet"),
            }
            if Instant::now() >= deadline {
                return Err(Error::Connectivity(format!(
                    "SSH to the cluster failed to start within {}s.",
                    limit.as_secs()
                )));
            }
            sleep(WAIT_INTERVAL).await;
        }
    }
}
