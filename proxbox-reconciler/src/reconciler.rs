//! Per-VM reconciliation driver.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::context::reconcile_context;
use crate::custom_fields::reconcile_custom_fields;
use crate::error::Result;
use crate::network::reconcile_primary_ip;
use crate::outcome::ReconcileOutcome;
use crate::resources::reconcile_resources;
use crate::status::reconcile_status;
use crate::traits::{HypervisorClient, RegistryClient};
use crate::types::{HypervisorVm, RegistryVm};

/// Outcome of every reconciler for one VM pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub vm: String,
    pub status: ReconcileOutcome,
    pub custom_fields: ReconcileOutcome,
    pub context: ReconcileOutcome,
    pub resources: ReconcileOutcome,
    pub primary_ip: ReconcileOutcome,
}

impl ReconcileReport {
    fn entries(&self) -> [(&'static str, &ReconcileOutcome); 5] {
        [
            ("status", &self.status),
            ("custom_fields", &self.custom_fields),
            ("context", &self.context),
            ("resources", &self.resources),
            ("primary_ip", &self.primary_ip),
        ]
    }

    /// Whether any reconciler wrote to the registry.
    pub fn changed(&self) -> bool {
        self.entries().iter().any(|(_, outcome)| outcome.changed())
    }

    /// Reconcilers that needed a write which did not go through.
    pub fn failures(&self) -> Vec<(&'static str, String)> {
        self.entries()
            .into_iter()
            .filter_map(|(name, outcome)| match outcome {
                ReconcileOutcome::Failed(reason) => Some((name, reason.clone())),
                _ => None,
            })
            .collect()
    }
}

/// Runs all reconcilers against one registry/hypervisor VM pair.
///
/// Holds no state between calls; safe to share across tasks working on
/// different VMs. Calls for the same VM must not overlap.
#[derive(Clone)]
pub struct VmReconciler {
    registry: Arc<dyn RegistryClient>,
    hypervisor: Arc<dyn HypervisorClient>,
    hypervisor_url: String,
}

impl VmReconciler {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        hypervisor: Arc<dyn HypervisorClient>,
        hypervisor_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            hypervisor,
            hypervisor_url: hypervisor_url.into(),
        }
    }

    /// Reconcile status, custom fields, context, resources and primary IP,
    /// in that order.
    ///
    /// An error from a reconciler that does not absorb failures aborts the
    /// remaining steps.
    #[instrument(skip_all, fields(vm = %registry_vm.name, vmid = hypervisor_vm.vmid))]
    pub async fn reconcile(
        &self,
        registry_vm: &mut RegistryVm,
        hypervisor_vm: &HypervisorVm,
    ) -> Result<ReconcileReport> {
        let registry = self.registry.as_ref();

        let status = reconcile_status(registry, registry_vm, hypervisor_vm).await?;
        let custom_fields = reconcile_custom_fields(registry, registry_vm, hypervisor_vm).await;
        let context =
            reconcile_context(registry, registry_vm, hypervisor_vm, &self.hypervisor_url).await?;
        let resources = reconcile_resources(registry, registry_vm, hypervisor_vm).await?;
        let primary_ip =
            reconcile_primary_ip(registry, self.hypervisor.as_ref(), registry_vm, hypervisor_vm)
                .await;

        let report = ReconcileReport {
            vm: registry_vm.name.clone(),
            status,
            custom_fields,
            context,
            resources,
            primary_ip,
        };
        debug!(changed = report.changed(), "VM reconciled");
        Ok(report)
    }
}
