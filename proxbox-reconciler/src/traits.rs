//! Client capabilities the reconcilers depend on.
//!
//! Both clients are injected into the reconcilers; nothing in this crate
//! holds a process-wide session.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::*;

/// Read access to the hypervisor.
#[async_trait]
pub trait HypervisorClient: Send + Sync {
    /// List every guest in the cluster.
    async fn list_vms(&self) -> Result<Vec<HypervisorVm>>;

    /// Fetch the raw configuration of one guest.
    async fn vm_config(&self, node: &str, vmid: u64, vm_type: VmType) -> Result<GuestConfig>;
}

/// Read/write access to the registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    // =========================================================================
    // Virtual machines
    // =========================================================================

    /// Look up a virtual machine by exact name.
    async fn find_vm(&self, name: &str) -> Result<Option<RegistryVm>>;

    /// Standard object update of a virtual machine.
    ///
    /// Returns `Ok(false)` when the registry answered with a non-success
    /// status; transport and decoding problems are `Err`.
    async fn update_vm(&self, vm_id: u64, payload: &Map<String, Value>) -> Result<bool>;

    // =========================================================================
    // Interfaces
    // =========================================================================

    /// Find an interface of the VM by name.
    async fn find_interface(&self, vm_id: u64, name: &str) -> Result<Option<VmInterface>>;

    /// Create an interface.
    async fn create_interface(&self, interface: &NewVmInterface) -> Result<VmInterface>;

    // =========================================================================
    // IP addresses
    // =========================================================================

    /// Create an IP address object.
    async fn create_ip_address(&self, ip: &NewIpAddress) -> Result<IpAddress>;

    /// Fetch an IP address object by id.
    async fn get_ip_address(&self, id: u64) -> Result<IpAddress>;

    /// Persist the address field of an IP address object.
    async fn save_ip_address(&self, ip: &IpAddress) -> Result<bool>;

    // =========================================================================
    // Raw access
    // =========================================================================

    /// Authenticated `PATCH` of a subset of fields on any resource.
    ///
    /// Needed for custom fields, which the object update surface does not
    /// patch partially. Returns the HTTP status code untouched.
    async fn partial_update(&self, resource: &ResourceRef, payload: &Value) -> Result<u16>;
}
