//! Capacity reconciliation: vCPUs, memory (MB) and disk (GB).

use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::compare::{capacity_matches, vcpus_match};
use crate::error::Result;
use crate::outcome::ReconcileOutcome;
use crate::traits::RegistryClient;
use crate::types::{HypervisorVm, RegistryVm};
use crate::units::{bytes_to_gigabytes, bytes_to_megabytes};

/// Compute the capacity fields that differ from the hypervisor.
///
/// Unset registry values are always staged.
pub fn stage_resources(registry_vm: &RegistryVm, hypervisor_vm: &HypervisorVm) -> Map<String, Value> {
    let mut staged = Map::new();

    let vcpus = hypervisor_vm.max_cpu;
    if !vcpus_match(registry_vm.vcpu_count.as_deref(), vcpus) {
        staged.insert("vcpus".to_string(), json!(vcpus));
    }

    let memory_mb = bytes_to_megabytes(hypervisor_vm.max_memory_bytes);
    if !capacity_matches(registry_vm.memory_mb, memory_mb) {
        staged.insert("memory".to_string(), json!(memory_mb));
    }

    let disk_gb = bytes_to_gigabytes(hypervisor_vm.max_disk_bytes);
    if !capacity_matches(registry_vm.disk_gb, disk_gb) {
        staged.insert("disk".to_string(), json!(disk_gb));
    }

    staged
}

/// Apply differing capacity fields as a single object update.
///
/// A rejected update is reported as [`ReconcileOutcome::Failed`]; transport
/// errors propagate.
#[instrument(skip_all, fields(vm = %registry_vm.name))]
pub async fn reconcile_resources(
    registry: &dyn RegistryClient,
    registry_vm: &mut RegistryVm,
    hypervisor_vm: &HypervisorVm,
) -> Result<ReconcileOutcome> {
    let staged = stage_resources(registry_vm, hypervisor_vm);
    if staged.is_empty() {
        debug!("Resources up to date");
        return Ok(ReconcileOutcome::NoChangeNeeded);
    }

    if !registry.update_vm(registry_vm.id, &staged).await? {
        warn!(fields = ?staged.keys().collect::<Vec<_>>(), "Registry rejected resource update");
        return Ok(ReconcileOutcome::failed("resource update rejected"));
    }

    if let Some(vcpus) = staged.get("vcpus").and_then(Value::as_f64) {
        registry_vm.vcpu_count = Some(format!("{:.2}", vcpus));
    }
    if let Some(memory) = staged.get("memory").and_then(Value::as_u64) {
        registry_vm.memory_mb = Some(memory);
    }
    if let Some(disk) = staged.get("disk").and_then(Value::as_u64) {
        registry_vm.disk_gb = Some(disk);
    }

    info!(update = %serde_json::Value::Object(staged), "Resources updated");
    Ok(ReconcileOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use crate::mock::MockRegistry;

    fn hypervisor_vm() -> HypervisorVm {
        HypervisorVm::new(100, "db-01", "pve-01")
            .with_cpu(2.0)
            .with_memory_bytes(4_294_967_296)
            .with_disk_bytes(34_359_738_368)
    }

    #[test]
    fn test_unset_vcpus_are_staged() {
        let vm = RegistryVm::new(1, "db-01").with_resources(None, Some(4294), Some(34));
        let staged = stage_resources(&vm, &hypervisor_vm());
        assert_eq!(Value::Object(staged), json!({"vcpus": 2.0}));
    }

    #[test]
    fn test_text_vcpus_compare_numerically() {
        let vm = RegistryVm::new(1, "db-01").with_resources(Some("2.00"), Some(4294), Some(34));
        assert!(stage_resources(&vm, &hypervisor_vm()).is_empty());
    }

    #[test]
    fn test_all_fields_staged() {
        let vm = RegistryVm::new(1, "db-01").with_resources(Some("1.00"), None, Some(20));
        let staged = stage_resources(&vm, &hypervisor_vm());
        assert_eq!(
            Value::Object(staged),
            json!({"vcpus": 2.0, "memory": 4294, "disk": 34})
        );
    }

    #[tokio::test]
    async fn test_single_combined_update() {
        let registry = MockRegistry::new();
        let mut vm = RegistryVm::new(1, "db-01");
        registry.insert_vm(vm.clone());

        let outcome = reconcile_resources(&registry, &mut vm, &hypervisor_vm()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);
        assert_eq!(registry.writes().len(), 1);
        assert_eq!(vm.vcpu_count.as_deref(), Some("2.00"));
        assert_eq!(vm.memory_mb, Some(4294));
        assert_eq!(vm.disk_gb, Some(34));

        let again = reconcile_resources(&registry, &mut vm, &hypervisor_vm()).await.unwrap();
        assert_eq!(again, ReconcileOutcome::NoChangeNeeded);
    }

    #[tokio::test]
    async fn test_rejected_update_is_failure() {
        let registry = MockRegistry::new();
        registry.reject_updates(true);
        let mut vm = RegistryVm::new(1, "db-01");

        let outcome = reconcile_resources(&registry, &mut vm, &hypervisor_vm()).await.unwrap();
        assert!(outcome.is_failed());
        assert_eq!(vm.memory_mb, None);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let registry = MockRegistry::new();
        registry.fail_requests(true);
        let mut vm = RegistryVm::new(1, "db-01");

        let result = reconcile_resources(&registry, &mut vm, &hypervisor_vm()).await;
        assert!(matches!(result, Err(ReconcileError::Transport(_))));
    }
}
