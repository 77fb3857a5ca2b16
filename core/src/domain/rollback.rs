//! Reversible cluster mutations.

use super::workload::{Workload, WorkloadKind};

/// Inverse of one cluster mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackAction {
    /// Delete every object of `kinds` (e.g. `svc,deploy`) carrying `selector`.
    DeleteBySelector { kinds: String, selector: String },
    /// Delete a single workload; absence is not an error.
    DeleteWorkload { kind: WorkloadKind, name: String },
    /// Scale a workload back to its original replica count.
    ScaleWorkload {
        kind: WorkloadKind,
        name: String,
        replicas: u32,
    },
    /// Replace a DeploymentConfig with its snapshot (triggers included) and roll it out.
    RestoreDeploymentConfig { name: String, snapshot: Workload },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackEntry {
    pub description: String,
    pub action: RollbackAction,
}

/// LIFO stack of pending rollback actions for one session.
///
/// Inverses are pushed before the mutation they undo is attempted.
#[derive(Debug, Default)]
pub struct RollbackStack {
    entries: Vec<RollbackEntry>,
}

impl RollbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, description: impl Into<String>, action: RollbackAction) {
        self.entries.push(RollbackEntry {
            description: description.into(),
            action,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending entries in registration order.
    pub fn entries(&self) -> &[RollbackEntry] {
        &self.entries
    }

    /// Remove every entry, most recently registered first.
    pub fn drain_lifo(&mut self) -> Vec<RollbackEntry> {
        let mut drained: Vec<_> = self.entries.drain(..).collect();
        drained.reverse();
        drained
    }
}
