//! Port exposure domain model.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Ports below this value need a privileged proxy image.
pub const PRIVILEGED_PORT_LIMIT: u16 = 1024;

/// The set of ports bridged between the local machine and the proxy pod.
///
/// `mappings` sends connections arriving at a remote port in the pod to a
/// local port. `to_pod` ports are forwarded from the local machine into the
/// pod, `from_pod` ports from the pod back to the local machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortExposure {
    /// Local port -> remote port.
    mappings: BTreeMap<u16, u16>,
    to_pod: BTreeSet<u16>,
    from_pod: BTreeSet<u16>,
}

impl PortExposure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `"local:remote"` or `"port"` specifications.
    pub fn parse<I, S>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exposure = Self::new();
        for spec in specs {
            let mapping: PortMapping = spec.as_ref().parse()?;
            exposure.expose(mapping.local, mapping.remote);
        }
        Ok(exposure)
    }

    /// Expose `local` in the pod as `remote`.
    pub fn expose(&mut self, local: u16, remote: u16) {
        self.mappings.insert(local, remote);
    }

    pub fn add_to_pod(&mut self, port: u16) {
        self.to_pod.insert(port);
    }

    pub fn add_from_pod(&mut self, port: u16) {
        self.from_pod.insert(port);
    }

    /// Merge ports discovered on a container.
    ///
    /// Manually exposed ports win: a discovered port that is already mapped
    /// on either side is left alone.
    pub fn merge_automatic_ports<I>(&mut self, ports: I)
    where
        I: IntoIterator<Item = u16>,
    {
        for port in ports {
            if self.mappings.contains_key(&port) || self.remote().contains(&port) {
                continue;
            }
            self.mappings.insert(port, port);
        }
    }

    /// (local, remote) pairs, ordered by local port.
    pub fn local_to_remote(&self) -> Vec<(u16, u16)> {
        self.mappings.iter().map(|(l, r)| (*l, *r)).collect()
    }

    /// Ports the pod exposes to the cluster.
    pub fn remote(&self) -> BTreeSet<u16> {
        self.mappings.values().copied().collect()
    }

    pub fn to_pod(&self) -> &BTreeSet<u16> {
        &self.to_pod
    }

    pub fn from_pod(&self) -> &BTreeSet<u16> {
        &self.from_pod
    }

    pub fn has_privileged_ports(&self) -> bool {
        self.remote().iter().any(|p| *p < PRIVILEGED_PORT_LIMIT)
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty() && self.to_pod.is_empty() && self.from_pod.is_empty()
    }

    /// SSH forwarding arguments covering every exposed port.
    pub fn ssh_forward_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (local, remote) in &self.mappings {
            args.push("-R".to_string());
            args.push(format!("*:{}:127.0.0.1:{}", remote, local));
        }
        for port in &self.to_pod {
            args.push("-L".to_string());
            args.push(format!("{}:127.0.0.1:{}", port, port));
        }
        for port in &self.from_pod {
            args.push("-R".to_string());
            args.push(format!("{}:127.0.0.1:{}", port, port));
        }
        args
    }
}

/// A single `local[:remote]` mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub local: u16,
    pub remote: u16,
}

impl FromStr for PortMapping {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| -> Result<u16> {
            match part.trim().parse::<u16>() {
                Ok(0) | Err(_) => Err(Error::InvalidPort(s.to_string())),
                Ok(port) => Ok(port),
            }
        };

        match s.split_once(':') {
            Some((local, remote)) => Ok(Self {
                local: parse(local)?,
                remote: parse(remote)?,
            }),
            None => {
                let port = parse(s)?;
                Ok(Self {
                    local: port,
                    remote: port,
                })
            }
        }
    }
}
