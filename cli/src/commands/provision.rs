//! Provisioning sessions: set up the proxy, hold it until a termination
//! signal, tear down.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use clap::Args;
use kubetunnel_core::{
    ClusterRoutes, DeploymentProvisioner, ImageOverride, ImagePolicy, KubernetesDiscovery,
    PortExposure, ProvisionMode, ProvisionOptions, Provisioned, RollbackExecutor, RollbackStack,
    RouteDiscovery, RunId, ShutdownSignal, SystemRunner, WorkloadRef,
};
use serde_json::json;
use tracing::{info, warn};

use super::ClusterTarget;

#[derive(Args)]
pub struct SessionArgs {
    /// Expose a local port to the cluster (PORT or LOCAL:REMOTE), repeatable
    #[arg(long = "expose")]
    expose: Vec<String>,

    /// Forward a local port to the same port in the pod, repeatable
    #[arg(long = "to-pod")]
    to_pod: Vec<u16>,

    /// Forward a pod port to the same local port, repeatable
    #[arg(long = "from-pod")]
    from_pod: Vec<u16>,

    /// Service account for the proxy pod
    #[arg(long)]
    service_account: Option<String>,

    /// Custom nameserver for the proxy
    #[arg(long)]
    nameserver: Option<String>,
}

impl SessionArgs {
    fn exposure(&self) -> Result<PortExposure> {
        let mut exposure = PortExposure::parse(&self.expose)?;
        for &port in &self.to_pod {
            exposure.add_to_pod(port);
        }
        for &port in &self.from_pod {
            exposure.add_from_pod(port);
        }
        Ok(exposure)
    }

    fn options(&self) -> ProvisionOptions {
        ProvisionOptions {
            service_account: self.service_account.clone(),
            nameserver: self.nameserver.clone(),
            ..ProvisionOptions::default()
        }
    }
}

pub async fn new_deployment(
    target: &ClusterTarget,
    name: &str,
    session: SessionArgs,
    annotations: BTreeMap<String, String>,
    labels: BTreeMap<String, String>,
    json: bool,
) -> Result<()> {
    let workload: WorkloadRef = name.parse()?;
    if workload.container.is_some() {
        bail!("A new deployment takes a plain name, got {}", name);
    }
    let options = ProvisionOptions {
        annotations,
        labels,
        ..session.options()
    };
    run_session(target, Some(ProvisionMode::CreateNew), workload, &session, options, json).await
}

pub async fn swap_deployment(
    target: &ClusterTarget,
    workload: &str,
    session: SessionArgs,
    json: bool,
) -> Result<()> {
    let workload: WorkloadRef = workload.parse()?;
    let options = session.options();
    run_session(target, None, workload, &session, options, json).await
}

pub async fn existing_deployment(
    target: &ClusterTarget,
    workload: &str,
    session: SessionArgs,
    json: bool,
) -> Result<()> {
    let workload: WorkloadRef = workload.parse()?;
    let options = session.options();
    run_session(
        target,
        Some(ProvisionMode::UseExisting),
        workload,
        &session,
        options,
        json,
    )
    .await
}

/// `mode` of `None` picks the supplant variant from the cluster.
///
/// SIGINT and SIGTERM are captured before anything touches the cluster, so
/// every way out of the session goes through the rollback stack.
async fn run_session(
    target: &ClusterTarget,
    mode: Option<ProvisionMode>,
    workload: WorkloadRef,
    session: &SessionArgs,
    options: ProvisionOptions,
    json: bool,
) -> Result<()> {
    let mut shutdown = ShutdownSignal::register().context("Failed to install signal handlers")?;
    let config = super::load_settings().await?;
    let runner = SystemRunner::new();
    let kubectl = target.kubectl.clone().or_else(|| config.kubectl_path.clone());

    let kube = match KubernetesDiscovery::new()
        .connect(
            &runner,
            kubectl.as_deref(),
            target.context.clone(),
            target.namespace.clone(),
        )
        .await
    {
        Ok(kube) => kube,
        Err(e) if e.is_cluster_not_connected() => {
            return Err(e).context(
                "The cluster is unreachable; check the current context with `kubectl config current-context`",
            )
        }
        Err(e) => return Err(e).context("Failed to reach the cluster"),
    };

    let policy = ImagePolicy {
        images: config.images(),
        ocp_override: ImageOverride::from_env(),
        cluster_is_openshift: kube.cluster_is_openshift,
    };
    let provisioner = DeploymentProvisioner::new(
        &runner,
        &kube,
        policy,
        RunId::generate(),
        config.rollout_timeout(),
    );

    let mode = match mode {
        Some(mode) => mode,
        None => provisioner.supplant_mode(&workload).await,
    };
    let mut exposure = session.exposure()?;
    let mut rollback = RollbackStack::new();

    let provisioned = provisioner
        .provision_or_unwind(
            mode,
            &workload,
            &mut exposure,
            &options,
            &mut rollback,
            shutdown.recv(),
        )
        .await
        .with_context(|| format!("Failed to provision proxy for {}", workload))?;

    let routes = match RouteDiscovery::new(&runner, &kube).discover().await {
        Ok(routes) => routes,
        Err(e) => {
            warn!(error = %e, "Could not work out the cluster address ranges");
            ClusterRoutes::default()
        }
    };

    print_provisioned(mode, &provisioned, &exposure, &routes, json)?;

    if rollback.is_empty() {
        return Ok(());
    }

    info!("Press Ctrl-C to tear the proxy down");
    shutdown.recv().await;
    info!("Tearing down");
    let failures = RollbackExecutor::new(&runner, &kube, config.rollout_timeout())
        .unwind(&mut rollback)
        .await;

    if !failures.is_empty() {
        bail!(
            "{} teardown step(s) failed; check the cluster for leftover objects",
            failures.len()
        );
    }
    Ok(())
}

fn print_provisioned(
    mode: ProvisionMode,
    provisioned: &Provisioned,
    exposure: &PortExposure,
    routes: &ClusterRoutes,
    json: bool,
) -> Result<()> {
    let ports: Vec<_> = exposure.local_to_remote();

    if json {
        let value = json!({
            "mode": mode,
            "name": provisioned.name,
            "runLabel": provisioned.run_label,
            "exposedPorts": ports,
            "cidrs": routes.cidrs(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Proxy: {}", provisioned.name);
    match &provisioned.run_label {
        Some(run_id) => println!("Label: {}", run_id.selector()),
        None => println!("Label: (existing deployment, not labelled)"),
    }
    for (local, remote) in ports {
        println!("Port:  {} -> {}", local, remote);
    }
    for cidr in routes.cidrs() {
        println!("Route: {}", cidr);
    }
    Ok(())
}
