//! Custom field reconciliation (`proxmox_id`, `proxmox_node`, `proxmox_type`).
//!
//! Only keys already declared on the registry record are written; the
//! engine never creates custom field definitions. Changes go through the
//! raw `partial_update` call because the object update surface cannot patch
//! custom fields individually.

use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::compare::values_match;
use crate::outcome::ReconcileOutcome;
use crate::traits::RegistryClient;
use crate::types::{HypervisorVm, RegistryVm, ResourceRef};

pub const PROXMOX_ID: &str = "proxmox_id";
pub const PROXMOX_NODE: &str = "proxmox_node";
pub const PROXMOX_TYPE: &str = "proxmox_type";

/// Custom fields this crate maintains, with the hypervisor-derived value.
pub fn desired_custom_fields(hypervisor_vm: &HypervisorVm) -> [(&'static str, Value); 3] {
    [
        (PROXMOX_ID, json!(hypervisor_vm.vmid)),
        (PROXMOX_NODE, json!(hypervisor_vm.node)),
        (PROXMOX_TYPE, json!(hypervisor_vm.vm_type.as_str())),
    ]
}

/// Compute the custom field values that differ from the hypervisor.
///
/// Missing declarations are logged and skipped.
pub fn stage_custom_fields(registry_vm: &RegistryVm, hypervisor_vm: &HypervisorVm) -> Map<String, Value> {
    let mut staged = Map::new();

    if registry_vm.custom_fields.is_empty() {
        warn!(vm = %registry_vm.name, "No custom fields declared for virtual machines");
        return staged;
    }

    for (key, desired) in desired_custom_fields(hypervisor_vm) {
        match registry_vm.custom_fields.get(key) {
            Some(current) if values_match(current, &desired) => {}
            Some(_) => {
                staged.insert(key.to_string(), desired);
            }
            None => {
                warn!(
                    vm = %registry_vm.name,
                    field = key,
                    "Custom field not declared or misconfigured"
                );
            }
        }
    }

    staged
}

/// Bring the maintained custom fields in line with the hypervisor.
///
/// Succeeds only when the registry answers the patch with HTTP 200; any other
/// status or a transport failure yields [`ReconcileOutcome::Failed`].
#[instrument(skip_all, fields(vm = %registry_vm.name))]
pub async fn reconcile_custom_fields(
    registry: &dyn RegistryClient,
    registry_vm: &mut RegistryVm,
    hypervisor_vm: &HypervisorVm,
) -> ReconcileOutcome {
    let staged = stage_custom_fields(registry_vm, hypervisor_vm);
    if staged.is_empty() {
        debug!("Custom fields up to date");
        return ReconcileOutcome::NoChangeNeeded;
    }

    // The update contract requires name and cluster alongside the patch.
    let body = json!({
        "name": registry_vm.name,
        "cluster": registry_vm.cluster,
        "custom_fields": staged,
    });

    let resource = ResourceRef::VirtualMachine(registry_vm.id);
    match registry.partial_update(&resource, &body).await {
        Ok(200) => {
            info!(fields = ?staged.keys().collect::<Vec<_>>(), "Custom fields updated");
            registry_vm.custom_fields.extend(staged);
            ReconcileOutcome::Applied
        }
        Ok(status) => {
            warn!(status, "Failed to update custom fields through HTTP request");
            ReconcileOutcome::failed(format!("HTTP {}", status))
        }
        Err(e) => {
            warn!(error = %e, "Failed to update custom fields through HTTP request");
            ReconcileOutcome::failed(e)
        }
    }
}
