//! Executing rollback actions against the cluster.

use std::time::Duration;

use tracing::{info, warn};

use crate::adapters::KubeInfo;
use crate::domain::{RollbackAction, RollbackStack, Workload, WorkloadKind};
use crate::error::{Error, Result};
use crate::ports::CommandRunner;

/// Extra time the runner allows on top of kubectl's own rollout timeout.
const ROLLOUT_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Runs rollback actions with kubectl / oc.
pub struct RollbackExecutor<'a, R> {
    runner: &'a R,
    kube: &'a KubeInfo,
    rollout_timeout: Duration,
}

impl<'a, R: CommandRunner> RollbackExecutor<'a, R> {
    pub fn new(runner: &'a R, kube: &'a KubeInfo, rollout_timeout: Duration) -> Self {
        Self {
            runner,
            kube,
            rollout_timeout,
        }
    }

    /// Perform a single action.
    pub async fn execute(&self, action: &RollbackAction) -> Result<()> {
        match action {
            RollbackAction::DeleteBySelector { kinds, selector } => {
                self.runner
                    .check_call(&self.kube.command([
                        "delete".to_string(),
                        "--ignore-not-found".to_string(),
                        kinds.clone(),
                        format!("--selector={}", selector),
                    ]))
                    .await
            }
            RollbackAction::DeleteWorkload { kind, name } => {
                self.runner
                    .check_call(&self.kube.command([
                        "delete",
                        kind.resource(),
                        name.as_str(),
                        "--ignore-not-found",
                    ]))
                    .await
            }
            RollbackAction::ScaleWorkload {
                kind,
                name,
                replicas,
            } => {
                self.runner
                    .check_call(&self.kube.command([
                        "scale".to_string(),
                        kind.resource().to_string(),
                        name.clone(),
                        format!("--replicas={}", replicas),
                    ]))
                    .await
            }
            RollbackAction::RestoreDeploymentConfig { name, snapshot } => {
                roll_out_deployment_config(
                    self.runner,
                    self.kube,
                    name,
                    snapshot,
                    self.rollout_timeout,
                )
                .await
            }
        }
    }

    /// Drain `stack` most-recent-first, running every action.
    ///
    /// A failing action is logged and collected; the remaining actions
    /// still run. The stack is empty afterwards.
    pub async fn unwind(&self, stack: &mut RollbackStack) -> Vec<Error> {
        let mut failures = Vec::new();

        for entry in stack.drain_lifo() {
            info!(step = %entry.description, "Rolling back");
            if let Err(e) = self.execute(&entry.action).await {
                warn!(step = %entry.description, error = %e, "Rollback step failed");
                failures.push(e);
            }
        }

        failures
    }
}

/// Submit a DeploymentConfig, trigger a new rollout and wait for it.
pub(crate) async fn roll_out_deployment_config<R: CommandRunner>(
    runner: &R,
    kube: &KubeInfo,
    name: &str,
    workload: &Workload,
    rollout_timeout: Duration,
) -> Result<()> {
    let object = WorkloadKind::DeploymentConfig.object(name);

    runner
        .check_call(&kube.command(["replace", "-f", "-"]).stdin(workload.to_json()?))
        .await?;
    runner
        .check_call(&kube.command(["rollout", "latest", object.as_str()]))
        .await?;
    runner
        .check_call(
            &kube
                .command([
                    "rollout".to_string(),
                    "status".to_string(),
                    "-w".to_string(),
                    object.clone(),
                    format!("--timeout={}s", rollout_timeout.as_secs()),
                ])
                .timeout(rollout_timeout + ROLLOUT_TIMEOUT_SLACK),
        )
        .await
}
