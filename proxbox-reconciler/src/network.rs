//! Primary IPv4 reconciliation.
//!
//! The address is read from the guest's network configuration
//! (`ipconfig0` for QEMU, `net0` for LXC), e.g.
//! `name=eth0,bridge=vmbr504,ip=172.16.19.251/24,type=veth`.
//!
//! Extraction is best effort: only the first IPv4 `ip=` entry is used,
//! IPv6 and `dhcp` entries yield nothing. The write sequence is not
//! transactional; a failure midway leaves earlier writes in place.

use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map};
use tracing::{debug, info, instrument, warn};

use crate::error::{ReconcileError, Result};
use crate::outcome::ReconcileOutcome;
use crate::traits::{HypervisorClient, RegistryClient};
use crate::types::*;

/// Interface created to carry the primary address.
pub const PRIMARY_INTERFACE_NAME: &str = "eth0";

static IPV4_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|,)\s*ip=(\d{1,3}(?:\.\d{1,3}){3})(?:/(\d{1,2}))?\s*(?:,|$)")
        .expect("IPv4 entry pattern is valid")
});

/// Extract the primary IPv4 address (with prefix length, if any) from a
/// guest configuration.
pub fn extract_primary_address(vm_type: VmType, config: &GuestConfig) -> Option<String> {
    let line = config.get(vm_type.network_config_key())?.as_str()?;
    extract_ip_entry(line)
}

/// Extract the first IPv4 `ip=` value from a comma separated key=value list.
///
/// The value must span the whole entry; octets above 255 or a prefix above
/// 32 make the entry malformed and nothing is returned.
pub fn extract_ip_entry(line: &str) -> Option<String> {
    let caps = IPV4_ENTRY.captures(line)?;
    let address = caps.get(1)?.as_str();
    address.parse::<Ipv4Addr>().ok()?;

    match caps.get(2) {
        Some(prefix) => {
            let len: u8 = prefix.as_str().parse().ok()?;
            (len <= 32).then(|| format!("{}/{}", address, len))
        }
        None => Some(address.to_string()),
    }
}

/// Read the guest config and extract its address; lookup errors count as
/// "no address".
pub async fn fetch_primary_address(
    hypervisor: &dyn HypervisorClient,
    hypervisor_vm: &HypervisorVm,
) -> Option<String> {
    match hypervisor
        .vm_config(&hypervisor_vm.node, hypervisor_vm.vmid, hypervisor_vm.vm_type)
        .await
    {
        Ok(config) => extract_primary_address(hypervisor_vm.vm_type, &config),
        Err(e) => {
            debug!(error = %e, "Guest config unavailable");
            None
        }
    }
}

/// Ensure the VM's primary IPv4 in the registry matches the guest config.
///
/// Never returns an error: every failure becomes [`ReconcileOutcome::Failed`].
/// When no address can be extracted the registry is left untouched, including
/// any address it already holds.
#[instrument(skip_all, fields(vm = %registry_vm.name))]
pub async fn reconcile_primary_ip(
    registry: &dyn RegistryClient,
    hypervisor: &dyn HypervisorClient,
    registry_vm: &mut RegistryVm,
    hypervisor_vm: &HypervisorVm,
) -> ReconcileOutcome {
    let Some(address) = fetch_primary_address(hypervisor, hypervisor_vm).await else {
        debug!("No IPv4 address in guest config");
        return ReconcileOutcome::NoChangeNeeded;
    };

    match apply_primary_ip(registry, registry_vm, &address).await {
        Ok(ip) => {
            info!(address = %ip.address, ip_id = ip.id, "Primary IPv4 set");
            registry_vm.primary_ip4 = Some(IpAddressRef::from(&ip));
            ReconcileOutcome::Applied
        }
        Err(e) => {
            warn!(address = %address, error = %e, "Failed to set primary IPv4");
            ReconcileOutcome::failed(e)
        }
    }
}

async fn apply_primary_ip(
    registry: &dyn RegistryClient,
    registry_vm: &RegistryVm,
    address: &str,
) -> Result<IpAddress> {
    let ip = match &registry_vm.primary_ip4 {
        None => create_primary_ip(registry, registry_vm, address).await?,
        Some(current) => {
            let mut ip = registry.get_ip_address(current.id).await?;
            ip.address = address.to_string();
            if !registry.save_ip_address(&ip).await? {
                return Err(ReconcileError::WriteRejected(format!("IP address {}", ip.id)));
            }
            ip
        }
    };

    // Re-assigned even when unchanged so a stale cached reference is refreshed.
    let mut payload = Map::new();
    payload.insert("primary_ip4".to_string(), json!(ip.id));
    if !registry.update_vm(registry_vm.id, &payload).await? {
        return Err(ReconcileError::WriteRejected(format!(
            "primary_ip4 of {}",
            registry_vm.name
        )));
    }

    Ok(ip)
}

async fn create_primary_ip(
    registry: &dyn RegistryClient,
    registry_vm: &RegistryVm,
    address: &str,
) -> Result<IpAddress> {
    let interface = match registry
        .find_interface(registry_vm.id, PRIMARY_INTERFACE_NAME)
        .await?
    {
        Some(existing) => {
            debug!(interface_id = existing.id, "Reusing existing interface");
            existing
        }
        None => {
            registry
                .create_interface(&NewVmInterface {
                    virtual_machine: registry_vm.id,
                    name: PRIMARY_INTERFACE_NAME.to_string(),
                })
                .await?
        }
    };

    registry
        .create_ip_address(&NewIpAddress::on_vm_interface(address, interface.id))
        .await
}
