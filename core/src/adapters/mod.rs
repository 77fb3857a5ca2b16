//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`
//! and the wrappers around the external tools a bridge drives: the cluster
//! client, `netstat`, `ssh`, process signals and the background processes.

pub mod kubectl;
pub mod process;
pub mod routes;
pub mod scanner;
pub mod signals;
pub mod ssh;
pub mod supervisor;

// Re-export main types for convenience
pub use kubectl::{detect_openshift, KubeInfo, KubernetesDiscovery};
pub use process::SystemRunner;
pub use routes::{ClusterRoutes, RouteDiscovery};
pub use scanner::{parse_established, ConnectionScanner, ConnectionTable};
pub use signals::ShutdownSignal;
pub use ssh::{SshClient, DEFAULT_SSH_PORT, DEFAULT_SSH_TARGET, SSH_USER};
pub use supervisor::ProcessSupervisor;
