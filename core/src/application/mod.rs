//! Application layer - Use case services.
//!
//! These services orchestrate domain logic and adapter interactions:
//! - Accept domain types as inputs
//! - Use ports (traits) for external dependencies
//! - Return domain types as outputs

mod provisioner;
mod readiness;
mod rollback;
mod tunnel;

pub use provisioner::{DeploymentProvisioner, ProvisionOptions, Provisioned};
pub use readiness::{
    resolve_probe_host, wait_until_ready, ReadinessTimings, PROBE_HOST, READY_EXIT_CODE,
};
pub use rollback::RollbackExecutor;
pub use tunnel::{ProxyConfig, TunnelBootstrapper, TunnelPlan, DEFAULT_SSH_WAIT};
