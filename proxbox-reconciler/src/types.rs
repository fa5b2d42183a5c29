//! Type definitions for hypervisor and registry virtual machine state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// HYPERVISOR SIDE
// =============================================================================

/// Guest virtualization type as reported by Proxmox VE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmType {
    /// Fully virtualized QEMU/KVM guest
    Qemu,
    /// LXC container
    Lxc,
}

impl VmType {
    /// API name of the type (`qemu` / `lxc`).
    pub fn as_str(&self) -> &'static str {
        match self {
            VmType::Qemu => "qemu",
            VmType::Lxc => "lxc",
        }
    }

    /// Configuration key holding the primary network definition.
    pub fn network_config_key(&self) -> &'static str {
        match self {
            VmType::Qemu => "ipconfig0",
            VmType::Lxc => "net0",
        }
    }
}

impl std::fmt::Display for VmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power state reported by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
    /// Anything else (e.g. a transient state); never drives a transition
    #[serde(other)]
    Unknown,
}

/// Live VM state read from the hypervisor.
///
/// Field names follow the `/cluster/resources?type=vm` listing so the
/// struct deserializes straight from the API. Capacity fields are required:
/// guests on an unreachable node are listed without them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypervisorVm {
    /// VM id, unique within the cluster
    pub vmid: u64,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Host node the guest lives on
    pub node: String,
    /// Guest type
    #[serde(rename = "type")]
    pub vm_type: VmType,
    /// Power state
    #[serde(rename = "status")]
    pub run_state: RunState,
    /// Configured vCPU count
    #[serde(rename = "maxcpu")]
    pub max_cpu: f64,
    /// Configured memory in bytes
    #[serde(rename = "maxmem")]
    pub max_memory_bytes: u64,
    /// Configured root disk size in bytes
    #[serde(rename = "maxdisk")]
    pub max_disk_bytes: u64,
}

impl HypervisorVm {
    /// Create a stopped QEMU guest with zero capacity.
    pub fn new(vmid: u64, name: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            vmid,
            name: name.into(),
            node: node.into(),
            vm_type: VmType::Qemu,
            run_state: RunState::Stopped,
            max_cpu: 0.0,
            max_memory_bytes: 0,
            max_disk_bytes: 0,
        }
    }

    pub fn with_type(mut self, vm_type: VmType) -> Self {
        self.vm_type = vm_type;
        self
    }

    pub fn with_run_state(mut self, run_state: RunState) -> Self {
        self.run_state = run_state;
        self
    }

    pub fn with_cpu(mut self, max_cpu: f64) -> Self {
        self.max_cpu = max_cpu;
        self
    }

    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    pub fn with_disk_bytes(mut self, bytes: u64) -> Self {
        self.max_disk_bytes = bytes;
        self
    }
}

/// Raw guest configuration (`/nodes/{node}/{type}/{vmid}/config`).
pub type GuestConfig = Map<String, Value>;

// =============================================================================
// REGISTRY SIDE
// =============================================================================

/// NetBox virtual machine status choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Offline,
    Active,
    Planned,
    Staged,
    Failed,
    Decommissioning,
    /// A site-specific choice not known to this crate
    #[serde(other)]
    Unknown,
}

impl VmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmStatus::Offline => "offline",
            VmStatus::Active => "active",
            VmStatus::Planned => "planned",
            VmStatus::Staged => "staged",
            VmStatus::Failed => "failed",
            VmStatus::Decommissioning => "decommissioning",
            VmStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for VmStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an IP address object held by a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressRef {
    pub id: u64,
    #[serde(default)]
    pub address: String,
}

/// Virtual machine record stored in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryVm {
    /// Registry object id
    pub id: u64,
    /// Display name (matched against the hypervisor name)
    pub name: String,
    /// Lifecycle status
    pub status: VmStatus,
    /// Owning cluster id, echoed back on custom field patches
    pub cluster: Option<u64>,
    /// vCPU count as the registry returns it (decimal text, e.g. `"2.00"`)
    pub vcpu_count: Option<String>,
    /// Memory in MB
    pub memory_mb: Option<u64>,
    /// Disk in GB
    pub disk_gb: Option<u64>,
    /// Custom fields declared for virtual machines, with current values
    pub custom_fields: Map<String, Value>,
    /// Free-form config context (`local_context_data`)
    pub local_context: Option<Value>,
    /// Primary IPv4 address
    pub primary_ip4: Option<IpAddressRef>,
}

impl RegistryVm {
    /// Create an active record with no capacity, custom fields or address.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: VmStatus::Active,
            cluster: None,
            vcpu_count: None,
            memory_mb: None,
            disk_gb: None,
            custom_fields: Map::new(),
            local_context: None,
            primary_ip4: None,
        }
    }

    pub fn with_status(mut self, status: VmStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_cluster(mut self, cluster: u64) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Declare a custom field with its current value (`Value::Null` when unset).
    pub fn with_custom_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_fields.insert(key.into(), value);
        self
    }

    pub fn with_resources(mut self, vcpus: Option<&str>, memory_mb: Option<u64>, disk_gb: Option<u64>) -> Self {
        self.vcpu_count = vcpus.map(str::to_string);
        self.memory_mb = memory_mb;
        self.disk_gb = disk_gb;
        self
    }

    pub fn with_primary_ip4(mut self, ip: IpAddressRef) -> Self {
        self.primary_ip4 = Some(ip);
        self
    }
}

/// Interface attached to a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInterface {
    pub id: u64,
    pub virtual_machine: u64,
    pub name: String,
}

/// Request body for creating a VM interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewVmInterface {
    pub virtual_machine: u64,
    pub name: String,
}

/// IP address object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    pub id: u64,
    /// Address with prefix length, e.g. `10.0.0.5/24`
    pub address: String,
    #[serde(default)]
    pub assigned_object_type: Option<String>,
    #[serde(default)]
    pub assigned_object_id: Option<u64>,
}

impl From<&IpAddress> for IpAddressRef {
    fn from(ip: &IpAddress) -> Self {
        Self {
            id: ip.id,
            address: ip.address.clone(),
        }
    }
}

/// Object type string for IPs assigned to VM interfaces.
pub const VM_INTERFACE_OBJECT_TYPE: &str = "virtualization.vminterface";

/// Request body for creating an IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIpAddress {
    pub address: String,
    pub assigned_object_type: String,
    pub assigned_object_id: u64,
}

impl NewIpAddress {
    /// An address assigned to the given VM interface.
    pub fn on_vm_interface(address: impl Into<String>, interface_id: u64) -> Self {
        Self {
            address: address.into(),
            assigned_object_type: VM_INTERFACE_OBJECT_TYPE.to_string(),
            assigned_object_id: interface_id,
        }
    }
}

/// Registry resource addressed by a raw API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRef {
    VirtualMachine(u64),
    IpAddress(u64),
}

impl ResourceRef {
    /// API path of the resource, with trailing slash.
    pub fn api_path(&self) -> String {
        match self {
            ResourceRef::VirtualMachine(id) => format!("/api/virtualization/virtual-machines/{}/", id),
            ResourceRef::IpAddress(id) => format!("/api/ipam/ip-addresses/{}/", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hypervisor_vm_from_cluster_resources() {
        let json = r#"{
            "id": "lxc/101",
            "vmid": 101,
            "name": "dns-01",
            "node": "pve-02",
            "type": "lxc",
            "status": "running",
            "maxcpu": 2,
            "maxmem": 2147483648,
            "maxdisk": 8589934592,
            "uptime": 12345
        }"#;

        let vm: HypervisorVm = serde_json::from_str(json).unwrap();
        assert_eq!(vm.vmid, 101);
        assert_eq!(vm.node, "pve-02");
        assert_eq!(vm.vm_type, VmType::Lxc);
        assert_eq!(vm.run_state, RunState::Running);
        assert_eq!(vm.max_cpu, 2.0);
        assert_eq!(vm.max_memory_bytes, 2_147_483_648);
    }

    #[test]
    fn test_unknown_run_state() {
        let json = r#"{"vmid": 1, "node": "n", "type": "qemu", "status": "paused",
                       "maxcpu": 1, "maxmem": 1073741824, "maxdisk": 0}"#;
        let vm: HypervisorVm = serde_json::from_str(json).unwrap();
        assert_eq!(vm.run_state, RunState::Unknown);
    }

    #[test]
    fn test_missing_capacity_is_rejected() {
        let json = r#"{"vmid": 100, "name": "web-01", "node": "pve-02", "type": "qemu", "status": "unknown"}"#;
        assert!(serde_json::from_str::<HypervisorVm>(json).is_err());
    }

    #[test]
    fn test_network_config_key() {
        assert_eq!(VmType::Qemu.network_config_key(), "ipconfig0");
        assert_eq!(VmType::Lxc.network_config_key(), "net0");
    }

    #[test]
    fn test_status_roundtrip_names() {
        let status: VmStatus = serde_json::from_str("\"decommissioning\"").unwrap();
        assert_eq!(status, VmStatus::Decommissioning);
        let status: VmStatus = serde_json::from_str("\"retired\"").unwrap();
        assert_eq!(status, VmStatus::Unknown);
        assert_eq!(VmStatus::Offline.to_string(), "offline");
    }

    #[test]
    fn test_resource_paths() {
        assert_eq!(
            ResourceRef::VirtualMachine(7).api_path(),
            "/api/virtualization/virtual-machines/7/"
        );
        assert_eq!(ResourceRef::IpAddress(3).api_path(), "/api/ipam/ip-addresses/3/");
    }
}
