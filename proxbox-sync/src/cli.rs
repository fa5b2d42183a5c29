//! Command-line argument parsing.

use clap::Parser;

/// Proxbox sync daemon - reconciles Proxmox VE guests into NetBox
#[derive(Parser, Debug)]
#[command(name = "proxbox-sync")]
#[command(about = "Proxbox sync daemon - reconciles Proxmox VE guests into NetBox")]
#[command(version)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "PROXBOX_CONFIG", default_value = "/etc/proxbox/proxbox.yaml")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Log format (pretty, json)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Run a single sync pass and exit
    #[arg(long)]
    pub once: bool,

    /// Seconds between sync passes (overrides config)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Number of VMs reconciled in parallel (overrides config)
    #[arg(long)]
    pub concurrency: Option<usize>,
}
