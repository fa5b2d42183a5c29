//! NetBox REST API client.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use proxbox_reconciler::{
    IpAddress, IpAddressRef, NewIpAddress, NewVmInterface, ReconcileError, RegistryClient,
    RegistryVm, ResourceRef, Result, VmInterface, VmStatus,
};

use crate::config::NetboxConfig;

const VIRTUAL_MACHINES: &str = "/api/virtualization/virtual-machines/";
const INTERFACES: &str = "/api/virtualization/interfaces/";
const IP_ADDRESSES: &str = "/api/ipam/ip-addresses/";

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    value: VmStatus,
}

#[derive(Debug, Deserialize)]
struct Nested {
    id: u64,
}

/// Virtual machine as returned by `/api/virtualization/virtual-machines/`.
#[derive(Debug, Deserialize)]
pub struct NetboxVm {
    id: u64,
    name: String,
    status: Option<Choice>,
    cluster: Option<Nested>,
    /// Decimal; text on recent releases, a number on older ones
    vcpus: Option<Value>,
    memory: Option<u64>,
    disk: Option<u64>,
    #[serde(default)]
    custom_fields: Map<String, Value>,
    local_context_data: Option<Value>,
    primary_ip4: Option<IpAddressRef>,
}

impl From<NetboxVm> for RegistryVm {
    fn from(vm: NetboxVm) -> Self {
        let vcpu_count = match vm.vcpus {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        RegistryVm {
            id: vm.id,
            name: vm.name,
            status: vm.status.map(|s| s.value).unwrap_or(VmStatus::Unknown),
            cluster: vm.cluster.map(|c| c.id),
            vcpu_count,
            memory_mb: vm.memory,
            disk_gb: vm.disk,
            custom_fields: vm.custom_fields,
            local_context: vm.local_context_data.filter(|c| !c.is_null()),
            primary_ip4: vm.primary_ip4,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NetboxInterface {
    id: u64,
    name: String,
    virtual_machine: Nested,
}

impl From<NetboxInterface> for VmInterface {
    fn from(interface: NetboxInterface) -> Self {
        VmInterface {
            id: interface.id,
            virtual_machine: interface.virtual_machine.id,
            name: interface.name,
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Token-authenticated NetBox client.
pub struct NetboxClient {
    base_url: String,
    token: String,
    http_client: reqwest::Client,
}

impl NetboxClient {
    pub fn new(config: &NetboxConfig) -> Self {
        Self {
            base_url: config.base_url(),
            token: config.token.clone(),
            http_client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|e| ReconcileError::Transport(e.to_string()))
    }

    /// Send a write and decode the created/updated object.
    async fn write_object<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let resp = self.send(builder).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, what, "NetBox rejected write");
            return Err(ReconcileError::WriteRejected(format!("{} (HTTP {}): {}", what, status, body)));
        }
        resp.json().await.map_err(|e| ReconcileError::Decode(e.to_string()))
    }

    /// Send a PATCH and report whether NetBox accepted it.
    async fn patch(&self, path: &str, payload: &Value) -> Result<bool> {
        let resp = self.send(self.request(Method::PATCH, path).json(payload)).await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        let body = resp.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, path, "NetBox rejected update");
        Ok(false)
    }
}

#[async_trait]
impl RegistryClient for NetboxClient {
    async fn find_vm(&self, name: &str) -> Result<Option<RegistryVm>> {
        let resp = self
            .send(self.request(Method::GET, VIRTUAL_MACHINES).query(&[("name", name)]))
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ReconcileError::Transport(format!("HTTP {} listing virtual machines", status)));
        }

        let page: Page<NetboxVm> = resp
            .json()
            .await
            .map_err(|e| ReconcileError::Decode(e.to_string()))?;

        let mut matches = page.results.into_iter().filter(|vm| vm.name == name);
        let found = matches.next();
        if matches.next().is_some() {
            warn!(vm = name, "Several virtual machines share this name, using the first");
        }
        Ok(found.map(RegistryVm::from))
    }

    async fn update_vm(&self, vm_id: u64, payload: &Map<String, Value>) -> Result<bool> {
        debug!(vm_id, payload = %serde_json::Value::Object(payload.clone()), "Updating virtual machine");
        self.patch(&ResourceRef::VirtualMachine(vm_id).api_path(), &Value::Object(payload.clone()))
            .await
    }

    async fn find_interface(&self, vm_id: u64, name: &str) -> Result<Option<VmInterface>> {
        let vm_id = vm_id.to_string();
        let resp = self
            .send(
                self.request(Method::GET, INTERFACES)
                    .query(&[("virtual_machine_id", vm_id.as_str()), ("name", name)]),
            )
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ReconcileError::Transport(format!("HTTP {} listing interfaces", status)));
        }

        let page: Page<NetboxInterface> = resp
            .json()
            .await
            .map_err(|e| ReconcileError::Decode(e.to_string()))?;
        Ok(page.results.into_iter().next().map(VmInterface::from))
    }

    async fn create_interface(&self, interface: &NewVmInterface) -> Result<VmInterface> {
        let created: NetboxInterface = self
            .write_object(self.request(Method::POST, INTERFACES).json(interface), "interface")
            .await?;
        Ok(created.into())
    }

    async fn create_ip_address(&self, ip: &NewIpAddress) -> Result<IpAddress> {
        self.write_object(self.request(Method::POST, IP_ADDRESSES).json(ip), "IP address")
            .await
    }

    async fn get_ip_address(&self, id: u64) -> Result<IpAddress> {
        let resp = self
            .send(self.request(Method::GET, &ResourceRef::IpAddress(id).api_path()))
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(ReconcileError::NotFound(format!("IP address {}", id))),
            status if !status.is_success() => Err(ReconcileError::Transport(format!(
                "HTTP {} fetching IP address {}",
                status, id
            ))),
            _ => resp.json().await.map_err(|e| ReconcileError::Decode(e.to_string())),
        }
    }

    async fn save_ip_address(&self, ip: &IpAddress) -> Result<bool> {
        self.patch(&ResourceRef::IpAddress(ip.id).api_path(), &json!({ "address": ip.address }))
            .await
    }

    async fn partial_update(&self, resource: &ResourceRef, payload: &Value) -> Result<u16> {
        let resp = self
            .send(self.request(Method::PATCH, &resource.api_path()).json(payload))
            .await?;
        Ok(resp.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_virtual_machine() {
        let json = r#"{
            "id": 42,
            "url": "http://netbox/api/virtualization/virtual-machines/42/",
            "name": "web-01",
            "status": {"value": "active", "label": "Active"},
            "cluster": {"id": 3, "name": "pve"},
            "vcpus": "2.00",
            "memory": 4096,
            "disk": null,
            "primary_ip4": {"id": 77, "family": 4, "address": "10.0.0.5/24"},
            "local_context_data": null,
            "custom_fields": {"proxmox_id": 100, "proxmox_node": null}
        }"#;

        let vm: RegistryVm = serde_json::from_str::<NetboxVm>(json).unwrap().into();
        assert_eq!(vm.id, 42);
        assert_eq!(vm.status, VmStatus::Active);
        assert_eq!(vm.cluster, Some(3));
        assert_eq!(vm.vcpu_count.as_deref(), Some("2.00"));
        assert_eq!(vm.memory_mb, Some(4096));
        assert_eq!(vm.disk_gb, None);
        assert_eq!(vm.primary_ip4.unwrap().address, "10.0.0.5/24");
        assert!(vm.local_context.is_none());
        assert_eq!(vm.custom_fields.len(), 2);
    }

    #[test]
    fn test_decode_numeric_vcpus_and_missing_fields() {
        let json = r#"{"id": 1, "name": "db", "vcpus": 4}"#;
        let vm: RegistryVm = serde_json::from_str::<NetboxVm>(json).unwrap().into();
        assert_eq!(vm.vcpu_count.as_deref(), Some("4"));
        assert_eq!(vm.status, VmStatus::Unknown);
        assert!(vm.custom_fields.is_empty());
        assert!(vm.primary_ip4.is_none());
    }

    #[test]
    fn test_decode_interface() {
        let json = r#"{"id": 5, "name": "eth0", "virtual_machine": {"id": 42, "name": "web-01"}}"#;
        let interface: VmInterface = serde_json::from_str::<NetboxInterface>(json).unwrap().into();
        assert_eq!(interface.virtual_machine, 42);
        assert_eq!(interface.name, "eth0");
    }

    #[test]
    fn test_request_headers() {
        let client = NetboxClient::new(&NetboxConfig {
            domain: "netbox".to_string(),
            http_port: 8000,
            token: "abc".to_string(),
            ssl: false,
        });
        let request = client
            .request(Method::PATCH, &ResourceRef::VirtualMachine(7).api_path())
            .build()
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            "http://netbox:8000/api/virtualization/virtual-machines/7/"
        );
        assert_eq!(request.headers()["Authorization"], "Token abc");
        assert_eq!(request.headers()["Content-Type"], "application/json");
    }
}
