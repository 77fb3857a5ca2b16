//! Domain layer - Pure bridge data and transforms.
//!
//! Nothing in here talks to a cluster or spawns a process, so every type can
//! be tested in isolation.

mod cidr;
mod exclusion;
mod exposure;
mod image;
mod manifest;
mod rollback;
mod session;
mod workload;

pub use cidr::{covering_cidr, ipv4_addresses, MIN_COVERING_PREFIX};
pub use exclusion::ExclusionList;
pub use exposure::{PortExposure, PortMapping, PRIVILEGED_PORT_LIMIT};
pub use image::{ImageOverride, ImagePolicy, ProxyImages, OCP_IMAGE_ENV};
pub use manifest::DeploymentManifest;
pub use rollback::{RollbackAction, RollbackEntry, RollbackStack};
pub use session::{
    derived_name, ProvisionMode, RunId, WorkloadRef, MAX_OBJECT_NAME_LEN, SESSION_LABEL_KEY,
};
pub use workload::{
    derive_proxy_workload, Container, ContainerPort, EnvVar, ObjectMeta, PodSpec, PodTemplate,
    ProxyOverrides, Workload, WorkloadKind, WorkloadSpec, NAMESERVER_ENV, NAMESPACE_ENV,
    PROXY_COMMAND,
};
