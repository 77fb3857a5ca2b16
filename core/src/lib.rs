//! kubetunnel Core Library
//!
//! Bridges a developer machine into a Kubernetes cluster.
//! Provides functionality to:
//! - Provision a proxy workload (create, supplant or reuse a Deployment)
//! - Roll back every cluster mutation in reverse order
//! - Bootstrap the SSH / sshuttle tunnel inside the local proxy container
//! - Work out which cluster address ranges the tunnel should route
//! - Probe the tunnel for readiness
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data and transforms
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: External system implementations
//! - `application`: Use case services
//!
//! The cluster is only ever reached through the `kubectl` (or `oc`) binary.

// Hexagonal architecture layers
pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub mod config;
pub mod error;

#[cfg(test)]
pub(crate) mod testing;

// Re-export domain types (primary API)
pub use domain::{
    ImageOverride, ImagePolicy, PortExposure, ProvisionMode, RollbackStack, RunId, WorkloadRef,
};

// Re-export other commonly used types
pub use adapters::{
    ClusterRoutes, KubeInfo, KubernetesDiscovery, ProcessSupervisor, RouteDiscovery, ShutdownSignal,
    SystemRunner,
};
pub use application::{
    DeploymentProvisioner, ProvisionOptions, Provisioned, ProxyConfig, RollbackExecutor,
    TunnelBootstrapper,
};
pub use config::{BridgeConfig, ConfigStore};
pub use error::{Error, Result};
pub use ports::{CommandRunner, CommandSpec};
