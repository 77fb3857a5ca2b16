//! Error types for the kubetunnel-core library.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for kubetunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while provisioning, bridging or tearing down a session.
#[derive(Error, Debug)]
pub enum Error {
    /// An external command exited with a non-zero status.
    ///
    /// `stderr` is kept verbatim for diagnosis.
    #[error("Command `{command}` failed ({}): {stderr}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An external command did not finish within its timeout.
    #[error("Command `{command}` timed out after {}s", .timeout.as_secs())]
    CommandTimeout { command: String, timeout: Duration },

    /// The workload to bridge could not be fetched.
    #[error("Failed to find {name}:\n{stderr}")]
    Lookup { name: String, stderr: String },

    /// A cluster mutation failed (not found, apply rejected, container missing).
    #[error("{0}")]
    Provision(String),

    /// SSH, the tunnel, or cluster DNS never became usable.
    #[error("{0}")]
    Connectivity(String),

    /// The connection table could not be turned into a safe exclusion list.
    #[error("Connection table scan failed: {0}")]
    Scan(String),

    /// A port mapping argument could not be parsed.
    #[error("Invalid port mapping: {0}")]
    InvalidPort(String),

    /// A workload reference (`name[:container]`) is malformed.
    #[error("Invalid workload reference: {0}")]
    InvalidWorkloadRef(String),

    /// A supervised background process exited unsuccessfully.
    #[error("{name} exited with {}", exit_label(.code))]
    ProcessExited { name: String, code: Option<i32> },

    /// A termination signal arrived before the operation finished.
    #[error("Interrupted before {0} finished")]
    Interrupted(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the captured stderr for command failures.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { stderr, .. } | Error::Lookup { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Wraps a failed cluster command into a provisioning error, keeping stderr intact.
    pub(crate) fn provision(context: impl std::fmt::Display, source: Error) -> Error {
        match source.stderr() {
            Some(stderr) => Error::Provision(format!("{}:\n{}", context, stderr)),
            None => Error::Provision(format!("{}: {}", context, source)),
        }
    }

    /// Returns true if kubectl reported that the cluster is unreachable.
    pub fn is_cluster_not_connected(&self) -> bool {
        let Some(stderr) = self.stderr() else {
            return false;
        };
        let lower = stderr.to_lowercase();
        lower.contains("connection refused")
            || lower.contains("no configuration has been provided")
            || lower.contains("dial tcp")
            || lower.contains("unable to connect to the server")
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
