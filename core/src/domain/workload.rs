//! Typed Deployment / DeploymentConfig documents.
//!
//! Only the fields the bridge reads or rewrites are modelled; everything else
//! is carried through untouched in the flattened `extra` maps, so a document
//! read from the cluster can be transformed and submitted back without loss.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::image::ImagePolicy;
use super::session::{RunId, SESSION_LABEL_KEY};
use super::PortExposure;
use crate::error::{Error, Result};

/// Entrypoint of the proxy image.
pub const PROXY_COMMAND: &str = "/usr/src/app/run.sh";

/// Environment variable carrying a custom nameserver into the proxy.
pub const NAMESERVER_ENV: &str = "KUBETUNNEL_NAMESERVER";

/// Environment variable carrying the pod's namespace into the proxy.
pub const NAMESPACE_ENV: &str = "KUBETUNNEL_CONTAINER_NAMESPACE";

/// Metadata fields owned by the API server; stale copies make `replace` fail.
const SERVER_MANAGED_METADATA: &[&str] = &[
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "generation",
    "managedFields",
    "selfLink",
];

/// The workload resource types the bridge can host a proxy in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    Deployment,
    /// OpenShift `DeploymentConfig`.
    DeploymentConfig,
}

impl WorkloadKind {
    /// Resource name as understood by kubectl / oc.
    pub fn resource(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::DeploymentConfig => "deploymentconfig",
        }
    }

    /// `dc/<name>` style reference.
    pub fn object(&self, name: &str) -> String {
        match self {
            WorkloadKind::Deployment => format!("deployment/{}", name),
            WorkloadKind::DeploymentConfig => format!("dc/{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: WorkloadSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    pub template: PodTemplate,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness_probe: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_message_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub container_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContainerPort {
    /// Kubernetes defaults a missing protocol to TCP.
    pub fn is_tcp(&self) -> bool {
        self.protocol
            .as_deref()
            .map(|p| p.eq_ignore_ascii_case("TCP"))
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<Value>,
}

impl EnvVar {
    pub fn value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
        }
    }

    pub fn field_ref(name: impl Into<String>, field_path: &str) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(json!({ "fieldRef": { "fieldPath": field_path } })),
        }
    }
}

impl Container {
    /// TCP ports this container declares.
    pub fn tcp_ports(&self) -> Vec<u16> {
        self.ports
            .iter()
            .filter(|p| p.is_tcp())
            .map(|p| p.container_port)
            .collect()
    }
}

impl Workload {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    /// Declared replica count; the API server defaults it to 1.
    pub fn replicas(&self) -> u32 {
        self.spec.replicas.unwrap_or(1)
    }

    pub fn containers(&self) -> &[Container] {
        &self.spec.template.spec.containers
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers().iter().find(|c| c.name == name)
    }

    /// The container to operate on: the named one, or the first one.
    pub fn resolve_container(&self, explicit: Option<&str>) -> Result<String> {
        match explicit {
            Some(name) => Ok(name.to_string()),
            None => self
                .containers()
                .first()
                .map(|c| c.name.clone())
                .ok_or_else(|| {
                    Error::Provision(format!(
                        "Workload {} has no containers",
                        self.name().unwrap_or("<unnamed>")
                    ))
                }),
        }
    }

    /// A copy suitable for `kubectl replace`: server-managed metadata and
    /// status are dropped.
    pub fn for_resubmission(&self) -> Workload {
        let mut workload = self.clone();
        for field in SERVER_MANAGED_METADATA {
            workload.metadata.extra.remove(*field);
        }
        workload.extra.remove("status");
        workload
    }
}

/// Inputs of the proxy transform besides the workload itself.
#[derive(Debug, Clone)]
pub struct ProxyOverrides<'a> {
    pub container: &'a str,
    pub run_id: &'a RunId,
    pub service_account: Option<&'a str>,
    pub nameserver: Option<&'a str>,
}

/// Derive the proxy-carrying variant of `original`.
///
/// The target container's TCP ports are merged into `exposure` before the
/// image is chosen, since they can make a privileged image necessary.
pub fn derive_proxy_workload(
    original: &Workload,
    overrides: &ProxyOverrides<'_>,
    exposure: &mut PortExposure,
    policy: &ImagePolicy,
) -> Result<Workload> {
    let mut derived = original.clone();
    let run_id = overrides.run_id.to_string();

    derived.spec.replicas = Some(1);
    derived
        .metadata
        .labels
        .insert(SESSION_LABEL_KEY.to_string(), run_id.clone());

    let template = &mut derived.spec.template;
    template
        .metadata
        .labels
        .insert(SESSION_LABEL_KEY.to_string(), run_id);
    if let Some(account) = overrides.service_account.filter(|a| !a.is_empty()) {
        template.spec.service_account_name = Some(account.to_string());
    }

    let container = template
        .spec
        .containers
        .iter_mut()
        .find(|c| c.name == overrides.container)
        .ok_or_else(|| {
            Error::Provision(format!(
                "Couldn't find container {} in the Deployment.",
                overrides.container
            ))
        })?;

    exposure.merge_automatic_ports(container.tcp_ports());
    container.image = Some(policy.select(exposure).to_string());
    container.image_pull_policy = Some("IfNotPresent".to_string());

    container.args = None;
    container.liveness_probe = None;
    container.readiness_probe = None;
    container.working_dir = None;
    container.lifecycle = None;

    container.command = Some(vec![PROXY_COMMAND.to_string()]);
    container.termination_message_policy = Some("FallbackToLogsOnError".to_string());

    if let Some(nameserver) = overrides.nameserver.filter(|n| !n.is_empty()) {
        container.env.push(EnvVar::value(NAMESERVER_ENV, nameserver));
    }
    container
        .env
        .push(EnvVar::field_ref(NAMESPACE_ENV, "metadata.namespace"));

    Ok(derived)
}
