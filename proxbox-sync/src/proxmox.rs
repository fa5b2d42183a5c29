//! Proxmox VE API client.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use proxbox_reconciler::{GuestConfig, HypervisorClient, HypervisorVm, ReconcileError, VmType};

use crate::config::ProxmoxConfig;

/// Envelope of every Proxmox API answer.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

/// Read-only client for one Proxmox VE cluster, authenticated by API token.
pub struct ProxmoxClient {
    base_url: String,
    auth_header: String,
    http_client: reqwest::Client,
}

impl ProxmoxClient {
    /// Create a client; fails when no usable token is configured.
    pub fn new(config: &ProxmoxConfig) -> Result<Self> {
        let token = config
            .usable_token()
            .ok_or_else(|| anyhow!("No API token configured for {}", config.domain))?;

        let http_client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.ssl)
            .build()?;

        Ok(Self {
            base_url: config.base_url(),
            auth_header: format!("PVEAPIToken={}!{}={}", config.user, token.name, token.value),
            http_client,
        })
    }

    /// API base URL, e.g. `https://pve:8006`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> proxbox_reconciler::Result<T> {
        let url = format!("{}/api2/json{}", self.base_url, path);
        debug!(url = %url, "Proxmox request");

        let resp = self
            .http_client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(|e| ReconcileError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReconcileError::Hypervisor(format!("HTTP {} on {}: {}", status, path, body)));
        }

        let body: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| ReconcileError::Decode(e.to_string()))?;
        Ok(body.data)
    }
}

/// Turn `/cluster/resources` entries into guests, skipping templates and
/// entries that do not decode (including guests of offline nodes, which are
/// listed without capacity).
pub fn parse_cluster_resources(entries: Vec<Value>) -> Vec<HypervisorVm> {
    entries
        .into_iter()
        .filter(|entry| entry.get("template").and_then(Value::as_u64) != Some(1))
        .filter_map(|entry| match serde_json::from_value::<HypervisorVm>(entry.clone()) {
            Ok(vm) => Some(vm),
            Err(e) => {
                warn!(entry = %entry, error = %e, "Skipping undecodable cluster resource");
                None
            }
        })
        .collect()
}

#[async_trait]
impl HypervisorClient for ProxmoxClient {
    async fn list_vms(&self) -> proxbox_reconciler::Result<Vec<HypervisorVm>> {
        let entries: Vec<Value> = self.get("/cluster/resources?type=vm").await?;
        Ok(parse_cluster_resources(entries))
    }

    async fn vm_config(
        &self,
        node: &str,
        vmid: u64,
        vm_type: VmType,
    ) -> proxbox_reconciler::Result<GuestConfig> {
        self.get(&format!("/nodes/{}/{}/{}/config", node, vm_type.as_str(), vmid))
            .await
    }
}
