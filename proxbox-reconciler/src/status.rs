//! Status reconciliation: hypervisor power state to registry status.
//!
//! | hypervisor | registry  | action          |
//! |------------|-----------|-----------------|
//! | running    | active    | none            |
//! | stopped    | offline   | none            |
//! | stopped    | active    | set `offline`   |
//! | running    | offline   | set `active`    |
//! | *          | any other | none            |
//!
//! `planned`, `staged`, `failed` and `decommissioning` are set by operators
//! and are never overwritten.

use serde_json::{json, Map};
use tracing::{debug, info, instrument, warn};

use crate::error::{ReconcileError, Result};
use crate::outcome::ReconcileOutcome;
use crate::traits::RegistryClient;
use crate::types::{HypervisorVm, RegistryVm, RunState, VmStatus};

/// Status the registry should move to, if any.
pub fn status_transition(current: VmStatus, run_state: RunState) -> Option<VmStatus> {
    match (run_state, current) {
        (RunState::Stopped, VmStatus::Active) => Some(VmStatus::Offline),
        (RunState::Running, VmStatus::Offline) => Some(VmStatus::Active),
        _ => None,
    }
}

/// Bring the registry status in line with the hypervisor power state.
///
/// A rejected write is returned as [`ReconcileError::WriteRejected`].
#[instrument(skip_all, fields(vm = %registry_vm.name))]
pub async fn reconcile_status(
    registry: &dyn RegistryClient,
    registry_vm: &mut RegistryVm,
    hypervisor_vm: &HypervisorVm,
) -> Result<ReconcileOutcome> {
    let Some(target) = status_transition(registry_vm.status, hypervisor_vm.run_state) else {
        debug!(
            status = %registry_vm.status,
            run_state = ?hypervisor_vm.run_state,
            "Status not updated"
        );
        return Ok(ReconcileOutcome::NoChangeNeeded);
    };

    let mut payload = Map::new();
    payload.insert("status".to_string(), json!(target.as_str()));

    if !registry.update_vm(registry_vm.id, &payload).await? {
        warn!(target_status = %target, "Registry rejected status update");
        return Err(ReconcileError::WriteRejected(format!(
            "status '{}' for {}",
            target, registry_vm.name
        )));
    }

    info!(from = %registry_vm.status, to = %target, "Status updated");
    registry_vm.status = target;
    Ok(ReconcileOutcome::Applied)
}
