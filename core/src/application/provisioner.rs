//! Getting a proxy endpoint into the cluster.
//!
//! Every mode except [`ProvisionMode::UseExisting`] mutates the cluster, and
//! each mutation has its inverse registered on the caller's
//! [`RollbackStack`] before it is attempted. When provisioning fails the
//! caller is expected to unwind that stack before reporting the error;
//! [`DeploymentProvisioner::provision_or_unwind`] does that, and also
//! unwinds when the session is cancelled mid-way.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::adapters::KubeInfo;
use crate::domain::{
    derive_proxy_workload, derived_name, DeploymentManifest, ImagePolicy, PortExposure,
    ProvisionMode, ProxyOverrides, RollbackAction, RollbackStack, RunId, Workload, WorkloadKind,
    WorkloadRef, NAMESERVER_ENV,
};
use crate::error::{Error, Result};
use crate::ports::CommandRunner;

use super::rollback::{roll_out_deployment_config, RollbackExecutor};

/// Caller-supplied knobs for the proxy workload.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    pub service_account: Option<String>,
    pub nameserver: Option<String>,
    /// Pod annotations for newly created Deployments.
    pub annotations: BTreeMap<String, String>,
    /// Extra pod labels for newly created Deployments.
    pub labels: BTreeMap<String, String>,
}

/// Where the proxy runs once provisioning succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    /// Name of the workload hosting the proxy.
    pub name: String,
    /// Session label value, absent when nothing was created.
    pub run_label: Option<RunId>,
}

/// Creates, supplants or looks up the proxy workload for one session.
pub struct DeploymentProvisioner<'a, R> {
    runner: &'a R,
    kube: &'a KubeInfo,
    policy: ImagePolicy,
    run_id: RunId,
    rollout_timeout: Duration,
}

impl<'a, R: CommandRunner> DeploymentProvisioner<'a, R> {
    pub fn new(
        runner: &'a R,
        kube: &'a KubeInfo,
        policy: ImagePolicy,
        run_id: RunId,
        rollout_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            kube,
            policy,
            run_id,
            rollout_timeout,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Run the provisioning strategy for `mode`.
    #[instrument(skip(self, exposure, options, rollback), fields(workload = %workload, run_id = %self.run_id))]
    pub async fn provision(
        &self,
        mode: ProvisionMode,
        workload: &WorkloadRef,
        exposure: &mut PortExposure,
        options: &ProvisionOptions,
        rollback: &mut RollbackStack,
    ) -> Result<Provisioned> {
        info!(?mode, "Provisioning proxy");
        match mode {
            ProvisionMode::UseExisting => self.use_existing(workload, exposure).await,
            ProvisionMode::CreateNew => self.create_new(workload, exposure, options, rollback).await,
            ProvisionMode::SupplantNative => {
                self.supplant_native(workload, exposure, options, rollback)
                    .await
            }
            ProvisionMode::SupplantOpenShift => {
                self.supplant_openshift(workload, exposure, options, rollback)
                    .await
            }
        }
    }

    /// [`provision`](Self::provision), abandoned as soon as `cancel`
    /// resolves. On failure or cancellation the rollback stack is unwound
    /// before returning, so the cluster is left as it was found.
    pub async fn provision_or_unwind<C>(
        &self,
        mode: ProvisionMode,
        workload: &WorkloadRef,
        exposure: &mut PortExposure,
        options: &ProvisionOptions,
        rollback: &mut RollbackStack,
        cancel: C,
    ) -> Result<Provisioned>
    where
        C: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            result = self.provision(mode, workload, exposure, options, rollback) => result,
            () = cancel => Err(Error::Interrupted(format!("provisioning {}", workload))),
        };

        if outcome.is_err() {
            let failures = self.executor().unwind(rollback).await;
            if !failures.is_empty() {
                warn!(count = failures.len(), "Cluster may still hold proxy objects");
            }
        }
        outcome
    }

    /// Pick the supplant variant: OpenShift when the cluster is OpenShift and
    /// a DeploymentConfig of that name exists.
    pub async fn supplant_mode(&self, workload: &WorkloadRef) -> ProvisionMode {
        if !self.kube.cluster_is_openshift {
            return ProvisionMode::SupplantNative;
        }
        let probe = self.kube.command([
            "get",
            "dc",
            workload.name.as_str(),
            "-o",
            "name",
        ]);
        match self.runner.check_call(&probe).await {
            Ok(()) => ProvisionMode::SupplantOpenShift,
            Err(e) => {
                debug!(error = %e, "No DeploymentConfig, supplanting a Deployment");
                ProvisionMode::SupplantNative
            }
        }
    }

    /// Use a proxy workload that is already running.
    pub async fn use_existing(
        &self,
        workload: &WorkloadRef,
        exposure: &mut PortExposure,
    ) -> Result<Provisioned> {
        let kind = self.kube.workload_kind();
        let existing = self.fetch(kind, &workload.name).await?;
        let container = existing.resolve_container(workload.container.as_deref())?;
        let ports = existing
            .container(&container)
            .ok_or_else(|| missing_container(&container))?
            .tcp_ports();
        exposure.merge_automatic_ports(ports);

        Ok(Provisioned {
            name: workload.name.clone(),
            run_label: None,
        })
    }

    /// Create a fresh Deployment (and Service) running the proxy image.
    pub async fn create_new(
        &self,
        workload: &WorkloadRef,
        exposure: &mut PortExposure,
        options: &ProvisionOptions,
        rollback: &mut RollbackStack,
    ) -> Result<Provisioned> {
        let name = workload.name.as_str();
        let cleanup = RollbackAction::DeleteBySelector {
            kinds: "svc,deploy".to_string(),
            selector: self.run_id.selector(),
        };
        rollback.push(format!("Delete proxy objects of {}", name), cleanup.clone());

        // Leftovers from a crashed session with the same label
        if let Err(e) = self.executor().execute(&cleanup).await {
            debug!(error = %e, "Pre-clean failed");
        }

        let mut env = BTreeMap::new();
        if let Some(nameserver) = options.nameserver.as_deref().filter(|n| !n.is_empty()) {
            env.insert(NAMESERVER_ENV.to_string(), nameserver.to_string());
        }
        let manifest = DeploymentManifest {
            name,
            run_id: &self.run_id,
            image: self.policy.select(exposure),
            service_account: options.service_account.as_deref(),
            env: &env,
            annotations: &options.annotations,
            labels: &options.labels,
        }
        .render();

        self.runner
            .check_call(&self.kube.command(["create", "-f", "-"]).stdin(manifest))
            .await
            .map_err(|e| Error::provision(format!("Failed to create deployment {}", name), e))?;

        let remote = exposure.remote();
        if !remote.is_empty() {
            let mut args = vec![
                "expose".to_string(),
                "deployment".to_string(),
                name.to_string(),
                format!("--labels={}", self.run_id.selector()),
            ];
            args.extend(remote.iter().rev().map(|port| format!("--port={}", port)));
            self.runner
                .check_call(&self.kube.command(args))
                .await
                .map_err(|e| Error::provision(format!("Failed to expose deployment {}", name), e))?;
        }

        info!(name = name, "Created proxy deployment");
        Ok(Provisioned {
            name: name.to_string(),
            run_label: Some(self.run_id.clone()),
        })
    }

    /// Run a proxy copy of a Deployment and scale the original to zero.
    pub async fn supplant_native(
        &self,
        workload: &WorkloadRef,
        exposure: &mut PortExposure,
        options: &ProvisionOptions,
        rollback: &mut RollbackStack,
    ) -> Result<Provisioned> {
        let name = workload.name.as_str();
        let original = self.fetch(WorkloadKind::Deployment, name).await?;
        let container = original.resolve_container(workload.container.as_deref())?;

        let new_name = derived_name(name, &self.run_id);
        let mut derived = self.derive(&original, &container, exposure, options)?;
        derived.metadata.name = Some(new_name.clone());

        let delete_copy = RollbackAction::DeleteWorkload {
            kind: WorkloadKind::Deployment,
            name: new_name.clone(),
        };
        rollback.push(format!("Delete proxy deployment {}", new_name), delete_copy.clone());

        if let Err(e) = self.executor().execute(&delete_copy).await {
            debug!(error = %e, "Removing stale proxy copy failed");
        }

        self.runner
            .check_call(
                &self
                    .kube
                    .command(["apply", "-f", "-"])
                    .stdin(derived.to_json()?),
            )
            .await
            .map_err(|e| Error::provision(format!("Failed to apply deployment {}", new_name), e))?;

        rollback.push(
            format!("Restore replicas of {}", name),
            RollbackAction::ScaleWorkload {
                kind: WorkloadKind::Deployment,
                name: name.to_string(),
                replicas: original.replicas(),
            },
        );
        self.runner
            .check_call(&self.kube.command(["scale", "deployment", name, "--replicas=0"]))
            .await
            .map_err(|e| Error::provision(format!("Failed to scale down deployment {}", name), e))?;

        info!(original = name, proxy = %new_name, "Supplanted deployment");
        Ok(Provisioned {
            name: new_name,
            run_label: Some(self.run_id.clone()),
        })
    }

    /// Swap the container of an OpenShift DeploymentConfig in place.
    pub async fn supplant_openshift(
        &self,
        workload: &WorkloadRef,
        exposure: &mut PortExposure,
        options: &ProvisionOptions,
        rollback: &mut RollbackStack,
    ) -> Result<Provisioned> {
        let name = workload.name.as_str();
        let object = WorkloadKind::DeploymentConfig.object(name);

        let snapshot = self.fetch(WorkloadKind::DeploymentConfig, name).await?;
        rollback.push(
            format!("Restore deployment config {}", name),
            RollbackAction::RestoreDeploymentConfig {
                name: name.to_string(),
                snapshot: snapshot.for_resubmission(),
            },
        );

        self.runner
            .check_call(&self.kube.command([
                "set",
                "triggers",
                object.as_str(),
                "--remove-all",
            ]))
            .await
            .map_err(|e| Error::provision(format!("Failed to remove triggers of {}", object), e))?;

        // Trigger removal bumped the resource version
        let current = self.fetch(WorkloadKind::DeploymentConfig, name).await?;
        let container = current.resolve_container(workload.container.as_deref())?;
        let derived = self.derive(&current, &container, exposure, options)?;

        roll_out_deployment_config(self.runner, self.kube, name, &derived, self.rollout_timeout)
            .await
            .map_err(|e| Error::provision(format!("Failed to roll out {}", object), e))?;

        info!(name = name, "Supplanted deployment config");
        Ok(Provisioned {
            name: name.to_string(),
            run_label: Some(self.run_id.clone()),
        })
    }

    async fn fetch(&self, kind: WorkloadKind, name: &str) -> Result<Workload> {
        let output = self
            .runner
            .output(&self.kube.command(["get", kind.resource(), name, "-o", "json"]))
            .await
            .map_err(|e| Error::Lookup {
                name: kind.object(name),
                stderr: e.stderr().map(str::to_string).unwrap_or_else(|| e.to_string()),
            })?;
        Workload::from_json(&output)
    }

    fn derive(
        &self,
        original: &Workload,
        container: &str,
        exposure: &mut PortExposure,
        options: &ProvisionOptions,
    ) -> Result<Workload> {
        let derived = derive_proxy_workload(
            original,
            &ProxyOverrides {
                container,
                run_id: &self.run_id,
                service_account: options.service_account.as_deref(),
                nameserver: options.nameserver.as_deref(),
            },
            exposure,
            &self.policy,
        )?;
        Ok(derived.for_resubmission())
    }

    fn executor(&self) -> RollbackExecutor<'_, R> {
        RollbackExecutor::new(self.runner, self.kube, self.rollout_timeout)
    }
}

fn missing_container(container: &str) -> Error {
    Error::Provision(format!(
        "Couldn't find container {} in the Deployment.",
        container
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::{ImageOverride, ProxyImages};
    use crate::testing::FakeRunner;

    const RUN_ID: &str = "0123456789abcdef0123456789abcdef";

    fn kube(openshift: bool) -> KubeInfo {
        KubeInfo::new("kubectl").with_openshift(openshift)
    }

    fn provisioner<'a>(runner: &'a FakeRunner, kube: &'a KubeInfo) -> DeploymentProvisioner<'a, FakeRunner> {
        DeploymentProvisioner::new(
            runner,
            kube,
            ImagePolicy {
                images: ProxyImages::new("docker.io/kubetunnel", "0.1.0"),
                ocp_override: ImageOverride::Auto,
                cluster_is_openshift: kube.cluster_is_openshift,
            },
            RUN_ID.parse().unwrap(),
            Duration::from_secs(300),
        )
    }

    fn deployment(name: &str, replicas: Option<u32>) -> String {
        let mut value = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": name, "resourceVersion": "42", "uid": "u-1" },
            "spec": {
                "template": {
                    "metadata": { "labels": { "app": name } },
                    "spec": {
                        "containers": [{
                            "name": "app",
                            "image": "example/app:1",
                            "args": ["--serve"],
                            "ports": [{ "containerPort": 8080 }, { "containerPort": 53, "protocol": "UDP" }]
                        }]
                    }
                }
            },
            "status": { "replicas": 3 }
        });
        if let Some(replicas) = replicas {
            value["spec"]["replicas"] = json!(replicas);
        }
        value.to_string()
    }

    #[tokio::test]
    async fn test_create_new_end_to_end() {
        let runner = FakeRunner::new();
        let kube = kube(false);
        let mut exposure = PortExposure::parse(["8080"]).unwrap();
        let mut rollback = RollbackStack::new();

        let provisioned = provisioner(&runner, &kube)
            .provision(
                ProvisionMode::CreateNew,
                &WorkloadRef::new("svc-a"),
                &mut exposure,
                &ProvisionOptions::default(),
                &mut rollback,
            )
            .await
            .unwrap();

        assert_eq!(provisioned.name, "svc-a");
        assert_eq!(provisioned.run_label.as_ref().map(RunId::as_str), Some(RUN_ID));
        assert_eq!(
            runner.commands(),
            [
                format!("delete --ignore-not-found svc,deploy --selector=kubetunnel={}", RUN_ID),
                "create -f -".to_string(),
                format!("expose deployment svc-a --labels=kubetunnel={} --port=8080", RUN_ID),
            ]
        );

        let manifest = runner.calls()[1].stdin.clone().unwrap();
        assert!(manifest.contains("image: \"docker.io/kubetunnel/proxy-k8s:0.1.0\""));
        assert!(manifest.contains(&format!("kubetunnel: \"{}\"", RUN_ID)));
        assert_eq!(manifest.matches("      - name:").count(), 1);

        assert_eq!(rollback.len(), 1);
        assert_eq!(
            rollback.entries()[0].action,
            RollbackAction::DeleteBySelector {
                kinds: "svc,deploy".to_string(),
                selector: format!("kubetunnel={}", RUN_ID),
            }
        );
    }

    #[tokio::test]
    async fn test_create_new_exposes_ports_descending() {
        let runner = FakeRunner::new();
        let kube = kube(false);
        let mut exposure = PortExposure::parse(["80", "9000:443", "8080"]).unwrap();

        provisioner(&runner, &kube)
            .create_new(
                &WorkloadRef::new("svc-a"),
                &mut exposure,
                &ProvisionOptions::default(),
                &mut RollbackStack::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            runner.commands()[2],
            format!(
                "expose deployment svc-a --labels=kubetunnel={} --port=8080 --port=443 --port=80",
                RUN_ID
            )
        );
        // Privileged remote ports need the privileged image
        assert!(runner.calls()[1]
            .stdin
            .as_deref()
            .unwrap()
            .contains("/proxy-k8s-priv:0.1.0"));
    }

    #[tokio::test]
    async fn test_expose_failure_keeps_cleanup_registered() {
        let runner = FakeRunner::new().fail("expose", "error: couldn't find port via --port flag");
        let kube = kube(false);
        let mut rollback = RollbackStack::new();

        let err = provisioner(&runner, &kube)
            .create_new(
                &WorkloadRef::new("svc-a"),
                &mut PortExposure::parse(["8080"]).unwrap(),
                &ProvisionOptions::default(),
                &mut rollback,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provision(ref m) if m.contains("couldn't find port")));
        assert_eq!(rollback.len(), 1);

        RollbackExecutor::new(&runner, &kube, Duration::from_secs(300))
            .unwind(&mut rollback)
            .await;
        assert!(runner
            .commands()
            .last()
            .unwrap()
            .starts_with("delete --ignore-not-found svc,deploy"));
    }

    #[tokio::test]
    async fn test_supplant_rollback_restores_original() {
        let runner = FakeRunner::new().respond("get deployment web -o json", deployment("web", Some(3)));
        let kube = kube(false);
        let mut exposure = PortExposure::parse(["9999"]).unwrap();
        let mut rollback = RollbackStack::new();
        let provisioner = provisioner(&runner, &kube);

        let provisioned = provisioner
            .provision(
                ProvisionMode::SupplantNative,
                &WorkloadRef::new("web"),
                &mut exposure,
                &ProvisionOptions::default(),
                &mut rollback,
            )
            .await
            .unwrap();

        let copy = format!("web-{}", RUN_ID);
        assert_eq!(provisioned.name, copy);
        assert!(exposure.remote().contains(&8080));
        assert!(!exposure.remote().contains(&53));

        let applied: serde_json::Value =
            serde_json::from_str(runner.calls()[2].stdin.as_deref().unwrap()).unwrap();
        assert_eq!(applied["metadata"]["name"], json!(copy));
        assert_eq!(applied["spec"]["replicas"], json!(1));
        assert!(applied["metadata"].get("resourceVersion").is_none());
        assert!(applied.get("status").is_none());
        assert!(applied["spec"]["template"]["spec"]["containers"][0]
            .get("args")
            .is_none());

        assert_eq!(
            runner.commands(),
            [
                "get deployment web -o json".to_string(),
                format!("delete deployment {} --ignore-not-found", copy),
                "apply -f -".to_string(),
                "scale deployment web --replicas=0".to_string(),
            ]
        );

        let executor = RollbackExecutor::new(&runner, &kube, Duration::from_secs(300));
        assert!(executor.unwind(&mut rollback).await.is_empty());
        assert_eq!(
            runner.commands()[4..],
            [
                "scale deployment web --replicas=3".to_string(),
                format!("delete deployment {} --ignore-not-found", copy),
            ]
        );

        // A second unwind has nothing left to do
        assert!(executor.unwind(&mut rollback).await.is_empty());
        assert_eq!(runner.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_supplant_restores_default_replica_count() {
        let runner = FakeRunner::new().respond("get deployment web -o json", deployment("web", None));
        let kube = kube(false);
        let mut rollback = RollbackStack::new();

        provisioner(&runner, &kube)
            .supplant_native(
                &WorkloadRef::new("web"),
                &mut PortExposure::new(),
                &ProvisionOptions::default(),
                &mut rollback,
            )
            .await
            .unwrap();

        let entries = rollback.drain_lifo();
        assert!(matches!(
            entries[0].action,
            RollbackAction::ScaleWorkload { replicas: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_supplant_missing_container() {
        let runner = FakeRunner::new().respond("get deployment web -o json", deployment("web", Some(2)));
        let kube = kube(false);
        let mut rollback = RollbackStack::new();

        let err = provisioner(&runner, &kube)
            .supplant_native(
                &WorkloadRef::new("web").with_container("sidecar"),
                &mut PortExposure::new(),
                &ProvisionOptions::default(),
                &mut rollback,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provision(ref m) if m.contains("sidecar")));
        assert!(rollback.is_empty());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_openshift_restore_registered_before_trigger_removal() {
        let runner = FakeRunner::new()
            .respond("get deploymentconfig web -o json", deployment("web", Some(2)))
            .fail("set triggers", "error: forbidden");
        let kube = kube(true);
        let mut rollback = RollbackStack::new();

        let err = provisioner(&runner, &kube)
            .supplant_openshift(
                &WorkloadRef::new("web"),
                &mut PortExposure::new(),
                &ProvisionOptions::default(),
                &mut rollback,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provision(ref m) if m.contains("forbidden")));
        assert_eq!(rollback.len(), 1);
        match &rollback.entries()[0].action {
            RollbackAction::RestoreDeploymentConfig { name, snapshot } => {
                assert_eq!(name, "web");
                assert_eq!(snapshot.replicas(), 2);
                assert!(!snapshot.metadata.extra.contains_key("resourceVersion"));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_openshift_supplant_rolls_out() {
        let runner = FakeRunner::new()
            .respond("get deploymentconfig web -o json", deployment("web", Some(2)));
        let kube = kube(true);

        let provisioned = provisioner(&runner, &kube)
            .supplant_openshift(
                &WorkloadRef::new("web"),
                &mut PortExposure::new(),
                &ProvisionOptions::default(),
                &mut RollbackStack::new(),
            )
            .await
            .unwrap();

        assert_eq!(provisioned.name, "web");
        assert_eq!(
            runner.commands(),
            [
                "get deploymentconfig web -o json",
                "set triggers dc/web --remove-all",
                "get deploymentconfig web -o json",
                "replace -f -",
                "rollout latest dc/web",
                "rollout status -w dc/web --timeout=300s",
            ]
        );
        let replaced = runner.calls()[3].stdin.clone().unwrap();
        assert!(replaced.contains("/proxy-ocp:0.1.0"));
    }

    #[tokio::test]
    async fn test_use_existing_merges_ports() {
        let runner = FakeRunner::new().respond("get deployment web -o json", deployment("web", Some(1)));
        let kube = kube(false);
        let mut exposure = PortExposure::parse(["9000:8080"]).unwrap();
        let mut rollback = RollbackStack::new();

        let provisioned = provisioner(&runner, &kube)
            .provision(
                ProvisionMode::UseExisting,
                &WorkloadRef::new("web"),
                &mut exposure,
                &ProvisionOptions::default(),
                &mut rollback,
            )
            .await
            .unwrap();

        assert_eq!(provisioned.run_label, None);
        // The manual mapping for 8080 wins over the container port
        assert_eq!(exposure.local_to_remote(), vec![(9000, 8080)]);
        assert!(rollback.is_empty());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_keeps_stderr() {
        let runner = FakeRunner::new().fail(
            "get deployment",
            "Error from server (NotFound): deployments.apps \"web\" not found\n",
        );
        let kube = kube(false);

        let err = provisioner(&runner, &kube)
            .use_existing(&WorkloadRef::new("web"), &mut PortExposure::new())
            .await
            .unwrap_err();

        match err {
            Error::Lookup { name, stderr } => {
                assert_eq!(name, "deployment/web");
                assert!(stderr.contains("NotFound"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_supplant_mode_resolution() {
        let vanilla = kube(false);
        let openshift = kube(true);
        let with_dc = FakeRunner::new();
        let without_dc = FakeRunner::new().fail("get dc", "not found");
        let web = WorkloadRef::new("web");

        assert_eq!(
            provisioner(&with_dc, &vanilla).supplant_mode(&web).await,
            ProvisionMode::SupplantNative
        );
        assert!(with_dc.calls().is_empty());
        assert_eq!(
            provisioner(&with_dc, &openshift).supplant_mode(&web).await,
            ProvisionMode::SupplantOpenShift
        );
        assert_eq!(
            provisioner(&without_dc, &openshift).supplant_mode(&web).await,
            ProvisionMode::SupplantNative
        );
    }

    #[tokio::test]
    async fn test_cancel_during_rollout_restores_deployment_config() {
        let runner = FakeRunner::new()
            .respond("get deploymentconfig web -o json", deployment("web", Some(2)))
            .stall_once("rollout status");
        let kube = kube(true);
        let mut rollback = RollbackStack::new();

        let err = provisioner(&runner, &kube)
            .provision_or_unwind(
                ProvisionMode::SupplantOpenShift,
                &WorkloadRef::new("web"),
                &mut PortExposure::new(),
                &ProvisionOptions::default(),
                &mut rollback,
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Interrupted(_)));
        assert!(rollback.is_empty());
        assert_eq!(
            &runner.commands()[3..],
            [
                "replace -f -",
                "rollout latest dc/web",
                "rollout status -w dc/web --timeout=300s",
                "replace -f -",
                "rollout latest dc/web",
                "rollout status -w dc/web --timeout=300s",
            ]
        );
        // The second submission is the snapshot, not the proxy
        let restored = runner.calls()[6].stdin.clone().unwrap();
        assert!(restored.contains("example/app:1"));
        assert!(!restored.contains("/proxy-ocp:"));
    }

    #[tokio::test]
    async fn test_cancel_during_expose_deletes_labelled_objects() {
        let runner = FakeRunner::new().stall_once("expose");
        let kube = kube(false);
        let mut rollback = RollbackStack::new();

        let err = provisioner(&runner, &kube)
            .provision_or_unwind(
                ProvisionMode::CreateNew,
                &WorkloadRef::new("svc-a"),
                &mut PortExposure::parse(["8080"]).unwrap(),
                &ProvisionOptions::default(),
                &mut rollback,
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Interrupted(ref m) if m.contains("svc-a")));
        assert_eq!(
            runner.commands().last().unwrap(),
            &format!("delete --ignore-not-found svc,deploy --selector=kubetunnel={}", RUN_ID)
        );
    }

    #[tokio::test]
    async fn test_failure_is_unwound_before_returning() {
        let runner = FakeRunner::new()
            .respond("get deployment web -o json", deployment("web", Some(3)))
            .fail("scale deployment web --replicas=0", "error: forbidden");
        let kube = kube(false);
        let mut rollback = RollbackStack::new();

        let err = provisioner(&runner, &kube)
            .provision_or_unwind(
                ProvisionMode::SupplantNative,
                &WorkloadRef::new("web"),
                &mut PortExposure::new(),
                &ProvisionOptions::default(),
                &mut rollback,
                std::future::pending(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provision(ref m) if m.contains("forbidden")));
        let commands = runner.commands();
        let tail: Vec<&str> = commands.iter().rev().take(2).map(String::as_str).collect();
        assert_eq!(
            tail,
            [
                format!("delete deployment web-{} --ignore-not-found", RUN_ID).as_str(),
                "scale deployment web --replicas=3",
            ]
        );
    }

    #[tokio::test]
    async fn test_success_keeps_rollback_for_teardown() {
        let runner = FakeRunner::new();
        let kube = kube(false);
        let mut rollback = RollbackStack::new();

        provisioner(&runner, &kube)
            .provision_or_unwind(
                ProvisionMode::CreateNew,
                &WorkloadRef::new("svc-a"),
                &mut PortExposure::new(),
                &ProvisionOptions::default(),
                &mut rollback,
                std::future::pending(),
            )
            .await
            .unwrap();

        assert_eq!(rollback.len(), 1);
        assert_eq!(runner.commands().len(), 2);
    }
}
