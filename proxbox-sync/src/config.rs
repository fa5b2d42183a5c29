//! Configuration management for the sync daemon.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// NetBox connection
    pub netbox: NetboxConfig,
    /// One entry per Proxmox cluster
    pub proxmox: Vec<ProxmoxConfig>,
    /// Sync loop settings
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).with_context(|| "Failed to parse config file")
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(interval) = args.interval {
            self.sync.interval_secs = interval;
        }

        if let Some(concurrency) = args.concurrency {
            self.sync.concurrency = concurrency;
        }

        self
    }

    /// Reject configurations that cannot reach either side.
    pub fn validate(&self) -> Result<()> {
        if self.netbox.domain.is_empty() {
            bail!("netbox.domain must be set");
        }
        if self.netbox.token.is_empty() {
            bail!("netbox.token must be set");
        }
        if self.proxmox.is_empty() {
            bail!("at least one proxmox cluster must be configured");
        }
        if self.sync.interval_secs == 0 {
            bail!("sync.interval_secs must be at least 1");
        }
        if self.sync.concurrency == 0 {
            bail!("sync.concurrency must be at least 1");
        }
        Ok(())
    }
}

/// NetBox connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetboxConfig {
    /// Host name or IP address
    pub domain: String,
    pub http_port: u16,
    /// API token
    pub token: String,
    /// Use HTTPS
    pub ssl: bool,
}

impl Default for NetboxConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            http_port: 80,
            token: String::new(),
            ssl: false,
        }
    }
}

impl NetboxConfig {
    /// Base URL of the API, without trailing slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.domain, self.http_port)
    }
}

/// Proxmox VE cluster connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxmoxConfig {
    /// Host name or IP address
    pub domain: String,
    pub http_port: u16,
    /// User owning the API token, e.g. `root@pam`
    pub user: String,
    pub token: Option<ProxmoxToken>,
    /// Verify the TLS certificate
    pub ssl: bool,
}

impl Default for ProxmoxConfig {
    fn default() -> Self {
        Self {
            domain: "proxbox.example.com".to_string(),
            http_port: 8006,
            user: "root@pam".to_string(),
            token: None,
            ssl: false,
        }
    }
}

impl ProxmoxConfig {
    /// Base URL of the API, without trailing slash.
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.domain, self.http_port)
    }

    /// The token, if one with a non-empty value is configured.
    pub fn usable_token(&self) -> Option<&ProxmoxToken> {
        self.token.as_ref().filter(|t| !t.value.is_empty())
    }
}

/// Proxmox API token.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxmoxToken {
    /// Token id
    pub name: String,
    /// Token secret
    pub value: String,
}

/// Sync loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between passes
    pub interval_secs: u64,
    /// VMs reconciled in parallel
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            concurrency: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const YAML: &str = r#"
netbox:
  domain: netbox.example.com
  http_port: 8000
  token: 0123456789abcdef
proxmox:
  - domain: pve-a.example.com
    user: sync@pve
    token:
      name: proxbox
      value: 039az154-23b2-4be0-8d20-b66abc8c4686
    ssl: true
  - domain: pve-b.example.com
sync:
  interval_secs: 60
"#;

    #[test]
    fn test_config_yaml_parsing() {
        let config = Config::from_yaml(YAML).unwrap();

        assert_eq!(config.netbox.base_url(), "http://netbox.example.com:8000");
        assert_eq!(config.proxmox.len(), 2);
        assert_eq!(config.proxmox[0].base_url(), "https://pve-a.example.com:8006");
        assert!(config.proxmox[0].usable_token().is_some());
        assert_eq!(config.proxmox[1].user, "root@pam");
        assert!(config.proxmox[1].usable_token().is_none());
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.sync.concurrency, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_token_is_unusable() {
        let yaml = r#"
proxmox:
  - domain: pve
    token: { name: proxbox, value: "" }
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.proxmox[0].usable_token().is_none());
    }

    #[test]
    fn test_validation() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml(YAML).unwrap();
        config.sync.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml(YAML).unwrap();
        config.proxmox.clear();
        assert!(config.validate().is_err());

        let mut config = Config::from_yaml(YAML).unwrap();
        config.sync.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from(["proxbox-sync", "--interval", "15", "--concurrency", "8"]);
        let config = Config::from_yaml(YAML).unwrap().with_cli_overrides(&args);
        assert_eq!(config.sync.interval_secs, 15);
        assert_eq!(config.sync.concurrency, 8);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = Config::from_yaml(include_str!("../proxbox.example.yaml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.proxmox[0].http_port, 8006);
    }

    #[test]
    fn test_netbox_https() {
        let netbox = NetboxConfig {
            domain: "nb".to_string(),
            http_port: 443,
            token: "t".to_string(),
            ssl: true,
        };
        assert_eq!(netbox.base_url(), "https://nb:443");
    }
}
