//! Bridge session identity.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Label key stamped on every object a session creates or mutates.
pub const SESSION_LABEL_KEY: &str = "kubetunnel";

/// Kubernetes object names and label values are limited to this length.
pub const MAX_OBJECT_NAME_LEN: usize = 63;

/// Unique identifier of one bridge session, used as the session label value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh 32-character lowercase hex run ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `kubetunnel=<run id>`, for `--selector` arguments.
    pub fn selector(&self) -> String {
        format!("{}={}", SESSION_LABEL_KEY, self.0)
    }
}

impl FromStr for RunId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > MAX_OBJECT_NAME_LEN || !is_dns_label(s) {
            return Err(Error::InvalidWorkloadRef(format!("invalid run id {:?}", s)));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A workload to bridge, written `name[:container]` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRef {
    pub name: String,
    pub container: Option<String>,
}

impl WorkloadRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: None,
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

impl FromStr for WorkloadRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, container) = match s.split_once(':') {
            Some((name, container)) => (name, Some(container)),
            None => (s, None),
        };

        if !is_dns_label(name) {
            return Err(Error::InvalidWorkloadRef(s.to_string()));
        }
        if let Some(container) = container {
            if !is_dns_label(container) {
                return Err(Error::InvalidWorkloadRef(s.to_string()));
            }
        }

        Ok(Self {
            name: name.to_string(),
            container: container.map(str::to_string),
        })
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container {
            Some(container) => write!(f, "{}:{}", self.name, container),
            None => f.write_str(&self.name),
        }
    }
}

/// How the proxy endpoint gets into the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProvisionMode {
    /// Create a fresh Deployment running the proxy image.
    CreateNew,
    /// Run a proxy copy of a Deployment and scale the original to zero.
    SupplantNative,
    /// Swap the container of an OpenShift DeploymentConfig in place.
    SupplantOpenShift,
    /// Use a proxy Deployment that is already running.
    UseExisting,
}

/// Name for the proxy copy of `name`, always ending in `-<run id>` and never
/// longer than [`MAX_OBJECT_NAME_LEN`].
pub fn derived_name(name: &str, run_id: &RunId) -> String {
    let suffix_len = run_id.as_str().len() + 1;
    let max_width = MAX_OBJECT_NAME_LEN.saturating_sub(suffix_len);
    let truncated: String = name.chars().take(max_width).collect();
    // Truncation can leave a trailing dash, which is not a valid name ending
    let truncated = truncated.trim_end_matches('-');
    format!("{}-{}", truncated, run_id)
}

fn is_dns_label(value: &str) -> bool {
    static DNS_LABEL: OnceLock<Regex> = OnceLock::new();
    let regex = DNS_LABEL.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9.]*[a-z0-9])?$").expect("valid DNS label regex")
    });
    value.len() <= 253 && regex.is_match(value)
}
