//! # Proxbox Sync Daemon
//!
//! Reads every guest from the configured Proxmox VE clusters and keeps the
//! matching NetBox virtual machine records up to date: status, custom
//! fields, config context, capacity and primary IPv4.
//!
//! ## Usage
//! ```bash
//! proxbox-sync --config /etc/proxbox/proxbox.yaml
//! proxbox-sync --once --log-level debug
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

mod cli;
mod config;
mod netbox;
mod proxmox;
mod sync;

use cli::Args;
use config::Config;
use netbox::NetboxClient;
use proxbox_common::LogFormat;
use proxbox_reconciler::RegistryClient;
use proxmox::ProxmoxClient;
use sync::{Cluster, SyncService};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let log_format: LogFormat = args.log_format.parse()?;
    proxbox_common::init_logging(&args.log_level, log_format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Proxbox sync daemon"
    );

    // Load configuration
    let config = match Config::load(&args.config) {
        Ok(cfg) => {
            info!(config_path = %args.config, "Configuration loaded");
            cfg.with_cli_overrides(&args)
        }
        Err(e) => {
            error!(error = %e, path = %args.config, "Failed to load configuration");
            return Err(e);
        }
    };
    config.validate().context("Invalid configuration")?;

    let registry: Arc<dyn RegistryClient> = Arc::new(NetboxClient::new(&config.netbox));

    let mut clusters = Vec::new();
    for proxmox_config in &config.proxmox {
        match ProxmoxClient::new(proxmox_config) {
            Ok(client) => {
                let url = client.base_url().to_string();
                info!(cluster = %proxmox_config.domain, url = %url, "Proxmox cluster configured");
                clusters.push(Cluster::new(
                    proxmox_config.domain.clone(),
                    registry.clone(),
                    Arc::new(client),
                    url,
                ));
            }
            Err(e) => {
                warn!(cluster = %proxmox_config.domain, error = %e, "Skipping Proxmox cluster");
            }
        }
    }

    if clusters.is_empty() {
        bail!("No usable Proxmox cluster configured");
    }

    info!(
        netbox = %config.netbox.base_url(),
        clusters = clusters.len(),
        concurrency = config.sync.concurrency,
        "Sync daemon configured"
    );

    let service = SyncService::new(
        registry,
        clusters,
        config.sync.concurrency,
        Duration::from_secs(config.sync.interval_secs),
    );

    if args.once {
        return service.run_once().await.ensure_no_failures();
    }

    service.run().await;
    Ok(())
}
