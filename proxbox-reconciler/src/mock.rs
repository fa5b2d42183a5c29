//! In-memory hypervisor and registry clients for testing and development.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::debug;

use crate::error::{ReconcileError, Result};
use crate::traits::{HypervisorClient, RegistryClient};
use crate::types::*;

fn poisoned<T>(_: T) -> ReconcileError {
    ReconcileError::Internal("Lock poisoned".to_string())
}

// =============================================================================
// HYPERVISOR
// =============================================================================

/// Mock hypervisor holding a fixed set of guests and their configs.
#[derive(Default)]
pub struct MockHypervisor {
    vms: RwLock<Vec<HypervisorVm>>,
    configs: RwLock<HashMap<(String, u64), GuestConfig>>,
    fail_requests: AtomicBool,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a guest to the cluster listing.
    pub fn add_vm(&self, vm: HypervisorVm) {
        if let Ok(mut vms) = self.vms.write() {
            vms.push(vm);
        }
    }

    /// Set one configuration key of a guest.
    pub fn set_config(&self, node: &str, vmid: u64, key: &str, value: impl Into<Value>) {
        if let Ok(mut configs) = self.configs.write() {
            configs
                .entry((node.to_string(), vmid))
                .or_default()
                .insert(key.to_string(), value.into());
        }
    }

    /// Make every subsequent request fail with a transport error.
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(ReconcileError::Transport("mock hypervisor unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl HypervisorClient for MockHypervisor {
    async fn list_vms(&self) -> Result<Vec<HypervisorVm>> {
        self.check_available()?;
        Ok(self.vms.read().map_err(poisoned)?.clone())
    }

    async fn vm_config(&self, node: &str, vmid: u64, _vm_type: VmType) -> Result<GuestConfig> {
        self.check_available()?;
        self.configs
            .read()
            .map_err(poisoned)?
            .get(&(node.to_string(), vmid))
            .cloned()
            .ok_or_else(|| ReconcileError::NotFound(format!("config of {}/{}", node, vmid)))
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// A write received by [`MockRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedWrite {
    UpdateVm { vm_id: u64, payload: Map<String, Value> },
    PartialUpdate { path: String, payload: Value },
    CreateInterface(NewVmInterface),
    CreateIpAddress(NewIpAddress),
    SaveIpAddress(IpAddress),
}

/// Mock registry storing objects in memory and recording every write.
pub struct MockRegistry {
    vms: RwLock<HashMap<u64, RegistryVm>>,
    interfaces: RwLock<Vec<VmInterface>>,
    ip_addresses: RwLock<HashMap<u64, IpAddress>>,
    writes: RwLock<Vec<RecordedWrite>>,
    next_id: AtomicU64,
    partial_update_status: AtomicU16,
    reject_updates: AtomicBool,
    fail_requests: AtomicBool,
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            vms: RwLock::new(HashMap::new()),
            interfaces: RwLock::new(Vec::new()),
            ip_addresses: RwLock::new(HashMap::new()),
            writes: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1000),
            partial_update_status: AtomicU16::new(200),
            reject_updates: AtomicBool::new(false),
            fail_requests: AtomicBool::new(false),
        }
    }

    /// Store a VM record.
    pub fn insert_vm(&self, vm: RegistryVm) {
        if let Ok(mut vms) = self.vms.write() {
            vms.insert(vm.id, vm);
        }
    }

    /// Store an IP address object.
    pub fn insert_ip_address(&self, ip: IpAddress) {
        if let Ok(mut ips) = self.ip_addresses.write() {
            ips.insert(ip.id, ip);
        }
    }

    /// Store an interface.
    pub fn insert_interface(&self, interface: VmInterface) {
        if let Ok(mut interfaces) = self.interfaces.write() {
            interfaces.push(interface);
        }
    }

    /// Status code answered to `partial_update` (default 200).
    pub fn set_partial_update_status(&self, status: u16) {
        self.partial_update_status.store(status, Ordering::SeqCst);
    }

    /// Answer object updates with a rejection.
    pub fn reject_updates(&self, reject: bool) {
        self.reject_updates.store(reject, Ordering::SeqCst);
    }

    /// Make every subsequent request fail with a transport error.
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn vm(&self, id: u64) -> Option<RegistryVm> {
        self.vms.read().ok()?.get(&id).cloned()
    }

    pub fn ip_address(&self, id: u64) -> Option<IpAddress> {
        self.ip_addresses.read().ok()?.get(&id).cloned()
    }

    pub fn interfaces(&self) -> Vec<VmInterface> {
        self.interfaces.read().map(|i| i.clone()).unwrap_or_default()
    }

    pub fn ip_addresses(&self) -> Vec<IpAddress> {
        self.ip_addresses
            .read()
            .map(|ips| ips.values().cloned().collect())
            .unwrap_or_default()
    }

    /// All writes received so far, in order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.read().map(|w| w.clone()).unwrap_or_default()
    }

    fn record(&self, write: RecordedWrite) -> Result<()> {
        debug!(?write, "Mock registry write");
        self.writes.write().map_err(poisoned)?.push(write);
        Ok(())
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(ReconcileError::Transport("mock registry unavailable".to_string()));
        }
        Ok(())
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Apply a VM update payload the way the registry would.
fn apply_vm_payload(vm: &mut RegistryVm, payload: &Map<String, Value>, ips: &HashMap<u64, IpAddress>) {
    for (key, value) in payload {
        match key.as_str() {
            "status" => {
                if let Ok(status) = serde_json::from_value(value.clone()) {
                    vm.status = status;
                }
            }
            "vcpus" => vm.vcpu_count = value.as_f64().map(|v| format!("{:.2}", v)),
            "memory" => vm.memory_mb = value.as_u64(),
            "disk" => vm.disk_gb = value.as_u64(),
            "local_context_data" => {
                vm.local_context = if value.is_null() { None } else { Some(value.clone()) };
            }
            "primary_ip4" => {
                vm.primary_ip4 = value.as_u64().map(|id| IpAddressRef {
                    id,
                    address: ips.get(&id).map(|ip| ip.address.clone()).unwrap_or_default(),
                });
            }
            "custom_fields" => {
                if let Some(fields) = value.as_object() {
                    for (k, v) in fields {
                        vm.custom_fields.insert(k.clone(), v.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn find_vm(&self, name: &str) -> Result<Option<RegistryVm>> {
        self.check_available()?;
        Ok(self
            .vms
            .read()
            .map_err(poisoned)?
            .values()
            .find(|vm| vm.name == name)
            .cloned())
    }

    async fn update_vm(&self, vm_id: u64, payload: &Map<String, Value>) -> Result<bool> {
        self.check_available()?;
        self.record(RecordedWrite::UpdateVm { vm_id, payload: payload.clone() })?;

        if self.reject_updates.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let ips = self.ip_addresses.read().map_err(poisoned)?;
        let mut vms = self.vms.write().map_err(poisoned)?;
        match vms.get_mut(&vm_id) {
            Some(vm) => {
                apply_vm_payload(vm, payload, &ips);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_interface(&self, vm_id: u64, name: &str) -> Result<Option<VmInterface>> {
        self.check_available()?;
        Ok(self
            .interfaces
            .read()
            .map_err(poisoned)?
            .iter()
            .find(|i| i.virtual_machine == vm_id && i.name == name)
            .cloned())
    }

    async fn create_interface(&self, interface: &NewVmInterface) -> Result<VmInterface> {
        self.check_available()?;
        self.record(RecordedWrite::CreateInterface(interface.clone()))?;

        let created = VmInterface {
            id: self.allocate_id(),
            virtual_machine: interface.virtual_machine,
            name: interface.name.clone(),
        };
        self.interfaces.write().map_err(poisoned)?.push(created.clone());
        Ok(created)
    }

    async fn create_ip_address(&self, ip: &NewIpAddress) -> Result<IpAddress> {
        self.check_available()?;
        self.record(RecordedWrite::CreateIpAddress(ip.clone()))?;

        let created = IpAddress {
            id: self.allocate_id(),
            address: ip.address.clone(),
            assigned_object_type: Some(ip.assigned_object_type.clone()),
            assigned_object_id: Some(ip.assigned_object_id),
        };
        self.ip_addresses
            .write()
            .map_err(poisoned)?
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_ip_address(&self, id: u64) -> Result<IpAddress> {
        self.check_available()?;
        self.ip_addresses
            .read()
            .map_err(poisoned)?
            .get(&id)
            .cloned()
            .ok_or_else(|| ReconcileError::NotFound(format!("IP address {}", id)))
    }

    async fn save_ip_address(&self, ip: &IpAddress) -> Result<bool> {
        self.check_available()?;
        self.record(RecordedWrite::SaveIpAddress(ip.clone()))?;

        if self.reject_updates.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut ips = self.ip_addresses.write().map_err(poisoned)?;
        match ips.get_mut(&ip.id) {
            Some(stored) => {
                stored.address = ip.address.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn partial_update(&self, resource: &ResourceRef, payload: &Value) -> Result<u16> {
        self.check_available()?;
        self.record(RecordedWrite::PartialUpdate {
            path: resource.api_path(),
            payload: payload.clone(),
        })?;

        let status = self.partial_update_status.load(Ordering::SeqCst);
        if status == 200 {
            if let (ResourceRef::VirtualMachine(id), Some(body)) = (resource, payload.as_object()) {
                let ips = self.ip_addresses.read().map_err(poisoned)?;
                if let Some(vm) = self.vms.write().map_err(poisoned)?.get_mut(id) {
                    apply_vm_payload(vm, body, &ips);
                }
            }
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_update_vm_applies_payload() {
        let registry = MockRegistry::new();
        registry.insert_vm(RegistryVm::new(1, "web-01"));

        let mut payload = Map::new();
        payload.insert("status".into(), json!("offline"));
        payload.insert("memory".into(), json!(2048));
        assert!(registry.update_vm(1, &payload).await.unwrap());

        let vm = registry.vm(1).unwrap();
        assert_eq!(vm.status, VmStatus::Offline);
        assert_eq!(vm.memory_mb, Some(2048));
        assert_eq!(registry.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_and_failed_requests() {
        let registry = MockRegistry::new();
        registry.insert_vm(RegistryVm::new(1, "web-01"));

        registry.reject_updates(true);
        assert!(!registry.update_vm(1, &Map::new()).await.unwrap());

        registry.fail_requests(true);
        assert!(matches!(
            registry.find_vm("web-01").await,
            Err(ReconcileError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_hypervisor_config_lookup() {
        let hypervisor = MockHypervisor::new();
        hypervisor.set_config("pve-01", 100, "net0", "name=eth0,ip=dhcp");

        let config = hypervisor.vm_config("pve-01", 100, VmType::Lxc).await.unwrap();
        assert_eq!(config["net0"], json!("name=eth0,ip=dhcp"));
        assert!(hypervisor.vm_config("pve-01", 101, VmType::Lxc).await.is_err());
    }
}
