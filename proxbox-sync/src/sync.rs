//! Sync loop - matches Proxmox guests to NetBox records and reconciles them.
//!
//! Each pass:
//! - lists every guest of every configured cluster
//! - looks up the NetBox record with the same name
//! - runs the reconcilers on each pair, several VMs in parallel
//!
//! A guest appears once per cluster listing, so no two tasks of a pass touch
//! the same VM.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use proxbox_reconciler::{HypervisorClient, HypervisorVm, RegistryClient, VmReconciler};

/// One Proxmox cluster and the reconciler bound to it.
pub struct Cluster {
    pub name: String,
    pub hypervisor: Arc<dyn HypervisorClient>,
    pub reconciler: VmReconciler,
}

impl Cluster {
    pub fn new(
        name: impl Into<String>,
        registry: Arc<dyn RegistryClient>,
        hypervisor: Arc<dyn HypervisorClient>,
        hypervisor_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            reconciler: VmReconciler::new(registry, hypervisor.clone(), hypervisor_url),
            hypervisor,
        }
    }
}

/// Counters for one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Guests listed by the hypervisors
    pub vms_seen: usize,
    /// Guests with no NetBox record of the same name
    pub vms_missing: usize,
    /// Guests whose record was changed
    pub vms_changed: usize,
    /// Guests with at least one failed write or an aborted reconciliation
    pub vms_failed: usize,
}

impl SyncStats {
    /// Fail when any VM of the pass failed, so one-shot runs exit non-zero.
    pub fn ensure_no_failures(&self) -> anyhow::Result<()> {
        if self.vms_failed > 0 {
            anyhow::bail!("Sync pass finished with {} failed VMs", self.vms_failed);
        }
        Ok(())
    }

    fn merge(&mut self, other: SyncStats) {
        self.vms_seen += other.vms_seen;
        self.vms_missing += other.vms_missing;
        self.vms_changed += other.vms_changed;
        self.vms_failed += other.vms_failed;
    }
}

/// What happened to one guest during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VmResult {
    Missing,
    Unchanged,
    Changed,
    Failed,
}

/// Drives reconciliation for all configured clusters.
pub struct SyncService {
    registry: Arc<dyn RegistryClient>,
    clusters: Vec<Cluster>,
    concurrency: usize,
    interval: Duration,
}

impl SyncService {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        clusters: Vec<Cluster>,
        concurrency: usize,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            clusters,
            concurrency: concurrency.max(1),
            interval,
        }
    }

    /// Run one pass over every cluster.
    ///
    /// A cluster that cannot be listed is logged and skipped.
    pub async fn run_once(&self) -> SyncStats {
        let mut stats = SyncStats::default();

        for cluster in &self.clusters {
            match self.sync_cluster(cluster).await {
                Ok(cluster_stats) => stats.merge(cluster_stats),
                Err(e) => error!(cluster = %cluster.name, error = %e, "Failed to list cluster guests"),
            }
        }

        info!(
            vms_seen = stats.vms_seen,
            vms_missing = stats.vms_missing,
            vms_changed = stats.vms_changed,
            vms_failed = stats.vms_failed,
            "Sync pass completed"
        );
        stats
    }

    /// Run passes forever, one every `interval`.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "Starting sync loop");
        let mut timer = interval(self.interval);

        loop {
            timer.tick().await;
            self.run_once().await;
        }
    }

    #[instrument(skip_all, fields(cluster = %cluster.name))]
    async fn sync_cluster(&self, cluster: &Cluster) -> proxbox_reconciler::Result<SyncStats> {
        let vms = cluster.hypervisor.list_vms().await?;
        debug!(count = vms.len(), "Listed cluster guests");

        let results: Vec<VmResult> = stream::iter(vms.iter())
            .map(|vm| self.sync_vm(cluster, vm))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut stats = SyncStats {
            vms_seen: vms.len(),
            ..SyncStats::default()
        };
        for result in results {
            match result {
                VmResult::Missing => stats.vms_missing += 1,
                VmResult::Changed => stats.vms_changed += 1,
                VmResult::Failed => stats.vms_failed += 1,
                VmResult::Unchanged => {}
            }
        }
        Ok(stats)
    }

    async fn sync_vm(&self, cluster: &Cluster, hypervisor_vm: &HypervisorVm) -> VmResult {
        let mut registry_vm = match self.registry.find_vm(&hypervisor_vm.name).await {
            Ok(Some(vm)) => vm,
            Ok(None) => {
                debug!(vm = %hypervisor_vm.name, "No NetBox record, skipping");
                return VmResult::Missing;
            }
            Err(e) => {
                warn!(vm = %hypervisor_vm.name, error = %e, "Failed to look up NetBox record");
                return VmResult::Failed;
            }
        };

        match cluster.reconciler.reconcile(&mut registry_vm, hypervisor_vm).await {
            Ok(report) => {
                let failures = report.failures();
                if !failures.is_empty() {
                    warn!(vm = %report.vm, ?failures, "VM partially reconciled");
                    VmResult::Failed
                } else if report.changed() {
                    VmResult::Changed
                } else {
                    VmResult::Unchanged
                }
            }
            Err(e) => {
                warn!(vm = %hypervisor_vm.name, error = %e, "VM reconciliation aborted");
                VmResult::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxbox_reconciler::{MockHypervisor, MockRegistry, RegistryVm, RunState, VmStatus};

    fn service(registry: Arc<MockRegistry>, hypervisor: Arc<MockHypervisor>) -> SyncService {
        let cluster = Cluster::new("pve", registry.clone(), hypervisor, "https://pve:8006");
        SyncService::new(registry, vec![cluster], 2, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_pass_counts() {
        let registry = Arc::new(MockRegistry::new());
        let hypervisor = Arc::new(MockHypervisor::new());

        hypervisor.add_vm(HypervisorVm::new(100, "web-01", "pve-01").with_run_state(RunState::Stopped));
        hypervisor.add_vm(HypervisorVm::new(101, "web-02", "pve-01"));
        hypervisor.add_vm(HypervisorVm::new(102, "orphan", "pve-02"));
        registry.insert_vm(RegistryVm::new(1, "web-01").with_status(VmStatus::Active));
        registry.insert_vm(RegistryVm::new(2, "web-02").with_status(VmStatus::Offline));

        let svc = service(registry.clone(), hypervisor);
        let stats = svc.run_once().await;
        assert_eq!(stats.vms_seen, 3);
        assert_eq!(stats.vms_missing, 1);
        assert_eq!(stats.vms_changed, 2);
        assert_eq!(stats.vms_failed, 0);
        assert_eq!(registry.vm(1).unwrap().status, VmStatus::Offline);

        // Everything converged on the first pass.
        let stats = svc.run_once().await;
        assert_eq!(stats.vms_changed, 0);
    }

    #[tokio::test]
    async fn test_unreachable_cluster_is_skipped() {
        let registry = Arc::new(MockRegistry::new());
        let hypervisor = Arc::new(MockHypervisor::new());
        hypervisor.add_vm(HypervisorVm::new(100, "web-01", "pve-01"));
        hypervisor.fail_requests(true);

        let stats = service(registry, hypervisor).run_once().await;
        assert_eq!(stats, SyncStats::default());
    }

    #[tokio::test]
    async fn test_rejected_writes_count_as_failed() {
        let registry = Arc::new(MockRegistry::new());
        let hypervisor = Arc::new(MockHypervisor::new());
        hypervisor.add_vm(HypervisorVm::new(100, "web-01", "pve-01"));
        registry.insert_vm(RegistryVm::new(1, "web-01").with_status(VmStatus::Offline));
        registry.reject_updates(true);

        let stats = service(registry, hypervisor).run_once().await;
        assert_eq!(stats.vms_failed, 1);
        assert!(stats.ensure_no_failures().is_err());
    }

    #[test]
    fn test_clean_pass_has_no_failures() {
        let stats = SyncStats {
            vms_seen: 3,
            vms_changed: 1,
            ..SyncStats::default()
        };
        assert!(stats.ensure_no_failures().is_ok());
    }
}
