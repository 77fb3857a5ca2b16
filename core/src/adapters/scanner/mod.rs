//! Local TCP connection table.

mod netstat;

use tracing::debug;

use crate::error::Result;
use crate::ports::{CommandRunner, CommandSpec};

pub use netstat::parse_established;

/// One snapshot of the connection table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTable {
    raw: String,
    endpoints: Vec<String>,
}

impl ConnectionTable {
    /// The unparsed `netstat` output.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Local and peer IPs of established connections.
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

/// Reads established TCP connections through `netstat -n`.
pub struct ConnectionScanner<'a, R> {
    runner: &'a R,
}

impl<'a, R: CommandRunner> ConnectionScanner<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    pub async fn scan(&self) -> Result<ConnectionTable> {
        let raw = self
            .runner
            .output(&CommandSpec::new("netstat").arg("-n"))
            .await?;
        let endpoints = parse_established(&raw)?;
        debug!(count = endpoints.len(), "Scanned established connections");
        Ok(ConnectionTable { raw, endpoints })
    }
}
