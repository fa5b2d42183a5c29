//! Config context reconciliation.
//!
//! Keeps a `proxmox` key inside the VM's `local_context_data` describing
//! where and how the guest runs. Other keys of the context are preserved.

use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::outcome::ReconcileOutcome;
use crate::traits::RegistryClient;
use crate::types::{HypervisorVm, RegistryVm};
use crate::units::bytes_to_gigabytes;

/// Context key owned by this crate.
pub const CONTEXT_KEY: &str = "proxmox";

/// Build the `proxmox` context block for a guest.
///
/// `hypervisor_url` is the API base of the cluster, e.g. `https://pve:8006`.
pub fn proxmox_context(hypervisor_vm: &HypervisorVm, hypervisor_url: &str) -> Value {
    json!({
        "name": hypervisor_vm.name,
        "url": hypervisor_url,
        "id": hypervisor_vm.vmid,
        "node": hypervisor_vm.node,
        "type": hypervisor_vm.vm_type.as_str(),
        "memory": format!("{} GB", bytes_to_gigabytes(hypervisor_vm.max_memory_bytes)),
        "disk": format!("{} GB", bytes_to_gigabytes(hypervisor_vm.max_disk_bytes)),
        "vcpu": hypervisor_vm.max_cpu,
    })
}

/// Merge the desired block into the current context.
///
/// Returns `None` when the context already holds it.
pub fn merged_context(current: Option<&Value>, desired: Value) -> Option<Value> {
    match current {
        None | Some(Value::Null) => Some(json!({ CONTEXT_KEY: desired })),
        Some(Value::Object(existing)) => {
            if existing.get(CONTEXT_KEY) == Some(&desired) {
                return None;
            }
            let mut merged = existing.clone();
            merged.insert(CONTEXT_KEY.to_string(), desired);
            Some(Value::Object(merged))
        }
        // A non-object context cannot carry keys; replace it.
        Some(_) => Some(json!({ CONTEXT_KEY: desired })),
    }
}

/// Bring the `proxmox` context block in line with the hypervisor.
#[instrument(skip_all, fields(vm = %registry_vm.name))]
pub async fn reconcile_context(
    registry: &dyn RegistryClient,
    registry_vm: &mut RegistryVm,
    hypervisor_vm: &HypervisorVm,
    hypervisor_url: &str,
) -> Result<ReconcileOutcome> {
    let desired = proxmox_context(hypervisor_vm, hypervisor_url);
    let Some(context) = merged_context(registry_vm.local_context.as_ref(), desired) else {
        debug!("Config context up to date");
        return Ok(ReconcileOutcome::NoChangeNeeded);
    };

    let mut payload = Map::new();
    payload.insert("local_context_data".to_string(), context.clone());

    if !registry.update_vm(registry_vm.id, &payload).await? {
        warn!("Registry rejected config context update");
        return Ok(ReconcileOutcome::failed("config context update rejected"));
    }

    info!("Config context updated");
    registry_vm.local_context = Some(context);
    Ok(ReconcileOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRegistry;
    use crate::types::VmType;

    const URL: &str = "https://pve.example.com:8006";

    fn hypervisor_vm() -> HypervisorVm {
        HypervisorVm::new(105, "mail-01", "pve-03")
            .with_type(VmType::Qemu)
            .with_cpu(4.0)
            .with_memory_bytes(8_589_934_592)
            .with_disk_bytes(53_687_091_200)
    }

    #[test]
    fn test_context_block() {
        let block = proxmox_context(&hypervisor_vm(), URL);
        assert_eq!(
            block,
            json!({
                "name": "mail-01",
                "url": URL,
                "id": 105,
                "node": "pve-03",
                "type": "qemu",
                "memory": "8 GB",
                "disk": "53 GB",
                "vcpu": 4.0
            })
        );
    }

    #[test]
    fn test_merge_preserves_other_keys() {
        let current = json!({"backup": {"policy": "daily"}, "proxmox": {"id": 1}});
        let merged = merged_context(Some(&current), json!({"id": 2})).unwrap();
        assert_eq!(merged, json!({"backup": {"policy": "daily"}, "proxmox": {"id": 2}}));
    }

    #[test]
    fn test_merge_noop_when_equal() {
        let current = json!({"proxmox": {"id": 2}});
        assert!(merged_context(Some(&current), json!({"id": 2})).is_none());
    }

    #[tokio::test]
    async fn test_empty_context_is_initialized() {
        let registry = MockRegistry::new();
        let mut vm = RegistryVm::new(1, "mail-01");
        registry.insert_vm(vm.clone());

        let outcome = reconcile_context(&registry, &mut vm, &hypervisor_vm(), URL).await.unwrap();
        assert!(outcome.changed());
        let stored = registry.vm(1).unwrap().local_context.unwrap();
        assert_eq!(stored[CONTEXT_KEY]["node"], json!("pve-03"));

        let again = reconcile_context(&registry, &mut vm, &hypervisor_vm(), URL).await.unwrap();
        assert_eq!(again, ReconcileOutcome::NoChangeNeeded);
    }
}
