//! kubectl / oc resolution and cluster flavour detection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::WorkloadKind;
use crate::error::{Error, Result};
use crate::ports::{CommandRunner, CommandSpec};

/// Default paths to search for kubectl.
const KUBECTL_PATHS: &[&str] = &[
    "/opt/homebrew/bin/kubectl", // Apple Silicon
    "/usr/local/bin/kubectl",    // Intel Mac / Homebrew
    "/usr/bin/kubectl",          // System
];

/// Default paths to search for the OpenShift client.
const OC_PATHS: &[&str] = &["/opt/homebrew/bin/oc", "/usr/local/bin/oc", "/usr/bin/oc"];

/// Timeout for discovery commands.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// How to talk to the cluster: which client binary, with which context and
/// namespace, and whether the cluster is OpenShift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeInfo {
    pub command: String,
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub cluster_is_openshift: bool,
}

impl KubeInfo {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            context: None,
            namespace: None,
            cluster_is_openshift: false,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_openshift(mut self, cluster_is_openshift: bool) -> Self {
        self.cluster_is_openshift = cluster_is_openshift;
        self
    }

    /// A client invocation scoped to this context and namespace.
    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = CommandSpec::new(&self.command);
        if let Some(context) = &self.context {
            spec = spec.arg("--context").arg(context);
        }
        if let Some(namespace) = &self.namespace {
            spec = spec.arg("--namespace").arg(namespace);
        }
        spec.args(args)
    }

    /// Workload kind that existing proxies are looked up as.
    pub fn workload_kind(&self) -> WorkloadKind {
        if self.cluster_is_openshift {
            WorkloadKind::DeploymentConfig
        } else {
            WorkloadKind::Deployment
        }
    }
}

/// Locates the cluster client binaries.
#[derive(Debug, Clone, Default)]
pub struct KubernetesDiscovery {
    kubectl_path: Option<PathBuf>,
    oc_path: Option<PathBuf>,
}

impl KubernetesDiscovery {
    /// Searches the well-known locations, then `PATH`.
    pub fn new() -> Self {
        Self {
            kubectl_path: find_executable(KUBECTL_PATHS).or_else(|| search_path("kubectl")),
            oc_path: find_executable(OC_PATHS).or_else(|| search_path("oc")),
        }
    }

    /// Creates a discovery with custom paths.
    pub fn with_paths(kubectl_path: Option<PathBuf>, oc_path: Option<PathBuf>) -> Self {
        Self {
            kubectl_path,
            oc_path,
        }
    }

    /// Build the cluster handle.
    ///
    /// An explicit client path wins. Otherwise kubectl is used, switching to
    /// `oc` on OpenShift clusters when it is installed.
    pub async fn connect<R: CommandRunner>(
        &self,
        runner: &R,
        explicit: Option<&Path>,
        context: Option<String>,
        namespace: Option<String>,
    ) -> Result<KubeInfo> {
        let client = match explicit {
            Some(path) => path.to_path_buf(),
            None => self
                .kubectl_path
                .clone()
                .or_else(|| self.oc_path.clone())
                .ok_or_else(|| {
                    Error::Config("Neither kubectl nor oc was found; install one or pass --kubectl".into())
                })?,
        };

        let mut kube = KubeInfo::new(client.to_string_lossy())
            .with_context(context)
            .with_namespace(namespace);
        let openshift = detect_openshift(runner, &kube).await?;
        kube.cluster_is_openshift = openshift;

        if openshift && explicit.is_none() {
            if let Some(oc) = &self.oc_path {
                kube.command = oc.to_string_lossy().into_owned();
            }
        }

        info!(
            client = %kube.command,
            openshift = kube.cluster_is_openshift,
            "Using cluster client"
        );
        Ok(kube)
    }
}

/// Whether the cluster serves any `openshift.io` API group.
pub async fn detect_openshift<R: CommandRunner>(runner: &R, kube: &KubeInfo) -> Result<bool> {
    let output = runner
        .output(&kube.command(["api-versions"]).timeout(DISCOVERY_TIMEOUT))
        .await?;
    let openshift = output.lines().any(|line| line.contains("openshift.io"));
    debug!(openshift = openshift, "Detected cluster flavour");
    Ok(openshift)
}

/// Finds an executable in the given paths.
fn find_executable(paths: &[&str]) -> Option<PathBuf> {
    paths.iter().map(PathBuf::from).find(|path| path.exists())
}

fn search_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    search_dirs(name, std::env::split_paths(&path))
}

fn search_dirs(name: &str, dirs: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    dirs.into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
