//! Discovery of the pod and service address ranges of a cluster.
//!
//! Node `podCIDR`s and the API server's `--service-cluster-ip-range` are
//! used when visible. Otherwise the ranges are guessed with
//! [`covering_cidr`] over the pod and ClusterIP addresses that exist now,
//! so workloads started later may fall outside them.

use ipnet::Ipv4Net;
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::{covering_cidr, ipv4_addresses};
use crate::error::{Error, Result};
use crate::ports::CommandRunner;

use super::kubectl::KubeInfo;

const SERVICE_RANGE_FLAG: &str = "--service-cluster-ip-range=";

#[derive(Debug, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    spec: NodeSpec,
}

#[derive(Debug, Default, Deserialize)]
struct NodeSpec {
    #[serde(rename = "podCIDR")]
    pod_cidr: Option<String>,
    #[serde(rename = "podCIDRs", default)]
    pod_cidrs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<PodContainer>,
}

#[derive(Debug, Deserialize)]
struct PodContainer {
    name: String,
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(rename = "podIP")]
    pod_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Service {
    #[serde(default)]
    spec: ServiceSpec,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSpec {
    #[serde(rename = "clusterIP")]
    cluster_ip: Option<String>,
}

/// Address ranges to route through the tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterRoutes {
    pub pods: Vec<Ipv4Net>,
    pub services: Vec<Ipv4Net>,
}

impl ClusterRoutes {
    /// Every range as CIDR text, pods first, without duplicates.
    pub fn cidrs(&self) -> Vec<String> {
        let mut cidrs: Vec<String> = Vec::new();
        for net in self.pods.iter().chain(&self.services) {
            let cidr = net.to_string();
            if !cidrs.contains(&cidr) {
                cidrs.push(cidr);
            }
        }
        cidrs
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty() && self.services.is_empty()
    }
}

/// Reads the cluster's address ranges through kubectl / oc.
pub struct RouteDiscovery<'a, R> {
    runner: &'a R,
    kube: &'a KubeInfo,
}

impl<'a, R: CommandRunner> RouteDiscovery<'a, R> {
    pub fn new(runner: &'a R, kube: &'a KubeInfo) -> Self {
        Self { runner, kube }
    }

    pub async fn discover(&self) -> Result<ClusterRoutes> {
        let routes = ClusterRoutes {
            pods: self.pod_ranges().await?,
            services: self.service_ranges().await?,
        };
        info!(cidrs = ?routes.cidrs(), "Discovered cluster address ranges");
        Ok(routes)
    }

    /// Node pod CIDRs, or a range covering the running pods.
    pub async fn pod_ranges(&self) -> Result<Vec<Ipv4Net>> {
        match self.list::<Node>(&["get", "nodes", "-o", "json"]).await {
            Ok(nodes) => {
                let ranges = parse_ranges(
                    nodes
                        .iter()
                        .flat_map(|node| node.spec.pod_cidr.iter().chain(&node.spec.pod_cidrs)),
                );
                if !ranges.is_empty() {
                    return Ok(ranges);
                }
            }
            Err(e) => debug!(error = %e, "Cannot list nodes, guessing the pod range"),
        }

        let pods = match self
            .list::<Pod>(&["get", "pods", "--all-namespaces", "-o", "json"])
            .await
        {
            Ok(pods) => pods,
            Err(e) => {
                debug!(error = %e, "Cannot list pods cluster-wide, using the namespace");
                self.list::<Pod>(&["get", "pods", "-o", "json"]).await?
            }
        };
        let ips = ipv4_addresses(pods.iter().filter_map(|pod| pod.status.pod_ip.as_deref()));
        Ok(covering_cidr(&ips).into_iter().collect())
    }

    /// The API server's service range, or a range covering the ClusterIPs.
    pub async fn service_ranges(&self) -> Result<Vec<Ipv4Net>> {
        match self
            .list::<Pod>(&["get", "pods", "--namespace", "kube-system", "-o", "json"])
            .await
        {
            Ok(system_pods) => {
                let ranges = parse_ranges(api_server_service_ranges(&system_pods));
                if !ranges.is_empty() {
                    return Ok(ranges);
                }
            }
            Err(e) => debug!(error = %e, "Cannot inspect kube-system, guessing the service range"),
        }

        let services = self.list::<Service>(&["get", "services", "-o", "json"]).await?;
        let ips = ipv4_addresses(
            services
                .iter()
                .filter_map(|service| service.spec.cluster_ip.as_deref()),
        );
        Ok(covering_cidr(&ips).into_iter().collect())
    }

    async fn list<T: serde::de::DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        let output = self.runner.output(&self.kube.command(args.iter().copied())).await?;
        let list: List<T> = serde_json::from_str(&output)
            .map_err(|e| Error::Config(format!("Unexpected `{}` output: {}", args.join(" "), e)))?;
        Ok(list.items)
    }
}

/// Values of `--service-cluster-ip-range=` on kube-apiserver containers;
/// dual-stack clusters list several ranges separated by commas.
fn api_server_service_ranges(pods: &[Pod]) -> Vec<&str> {
    pods.iter()
        .flat_map(|pod| &pod.spec.containers)
        .filter(|container| container.name == "kube-apiserver")
        .flat_map(|container| container.command.iter().chain(&container.args))
        .filter_map(|arg| arg.strip_prefix(SERVICE_RANGE_FLAG))
        .flat_map(|value| value.split(','))
        .collect()
}

/// IPv4 networks among `values`, de-duplicated; other entries are skipped.
fn parse_ranges<'a, I, S>(values: I) -> Vec<Ipv4Net>
where
    I: IntoIterator<Item = &'a S>,
    S: AsRef<str> + ?Sized + 'a,
{
    let mut ranges = Vec::new();
    for value in values {
        match value.as_ref().trim().parse::<Ipv4Net>() {
            Ok(net) if !ranges.contains(&net.trunc()) => ranges.push(net.trunc()),
            Ok(_) => {}
            Err(_) => debug!(value = value.as_ref(), "Skipping non-IPv4 range"),
        }
    }
    ranges
}
