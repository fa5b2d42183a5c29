//! # Proxbox Reconciler
//!
//! Keeps NetBox virtual machine records in line with the guests running on
//! a Proxmox VE cluster.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      VmReconciler                        │
//! │  status → custom fields → context → resources → IPv4     │
//! └───────────────┬──────────────────────────┬───────────────┘
//!                 ▼                          ▼
//!       ┌───────────────────┐      ┌───────────────────┐
//!       │  RegistryClient   │      │ HypervisorClient  │
//!       │ (NetBox, mock)    │      │ (Proxmox, mock)   │
//!       └───────────────────┘      └───────────────────┘
//! ```
//!
//! Each reconciler compares one concern, writes through to the registry on
//! divergence and reports a [`ReconcileOutcome`]. They are independent of
//! each other and hold no state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use proxbox_reconciler::{MockHypervisor, MockRegistry, VmReconciler};
//!
//! let reconciler = VmReconciler::new(
//!     Arc::new(MockRegistry::new()),
//!     Arc::new(MockHypervisor::new()),
//!     "https://pve.example.com:8006",
//! );
//! let report = reconciler.reconcile(&mut registry_vm, &hypervisor_vm).await?;
//! println!("changed: {}", report.changed());
//! ```

pub mod compare;
pub mod context;
pub mod custom_fields;
pub mod error;
pub mod mock;
pub mod network;
pub mod outcome;
pub mod reconciler;
pub mod resources;
pub mod status;
pub mod traits;
pub mod types;
pub mod units;

pub use error::{ReconcileError, Result};
pub use mock::{MockHypervisor, MockRegistry, RecordedWrite};
pub use outcome::ReconcileOutcome;
pub use reconciler::{ReconcileReport, VmReconciler};
pub use traits::{HypervisorClient, RegistryClient};
pub use types::*;
pub use units::{bytes_to_gigabytes, bytes_to_megabytes};
