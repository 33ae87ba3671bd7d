//! Prune execution
//!
//! Planning is pure (`vaultline_core::prune`). This module adds the side
//! effects: the `prune:<group|all>` lease, re-planning under the lease,
//! dropping snapshots in the engine and removing ledger rows.

use crate::lease::JobLeaseManager;
use crate::metrics::{OPERATIONS_TOTAL, PRUNE_BACKUPS_TOTAL};
use crate::resolver::ChainResolver;
use crate::{map_storage_error, Error, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use vaultline_core::prune::plan;
use vaultline_core::{
    Engine, LabelContext, LabelGenerator, LeaseOutcome, PrunePlan, PruneStrategy,
    RetainedBackup, Scope,
};
use vaultline_storage::Ledger;

#[derive(Debug, Clone)]
pub struct PruneRequest {
    /// Restrict candidates to one group; all groups when absent
    pub group: Option<String>,
    pub strategy: PruneStrategy,
    /// Plan only, no lease and no mutation
    pub dry_run: bool,
}

/// Backup that could not be fully removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    pub label: String,
    pub reason: String,
}

/// What a prune planned and did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub strategy: &'static str,
    pub dry_run: bool,
    /// Delete-set, oldest first
    pub planned: Vec<String>,
    pub deleted: Vec<String>,
    pub retained_due_to_dependency: Vec<RetainedBackup>,
    pub unknown_labels: Vec<String>,
    pub partial_failures: Vec<PartialFailure>,
}

impl PruneReport {
    fn from_plan(strategy: &PruneStrategy, dry_run: bool, plan: &PrunePlan) -> Self {
        Self {
            strategy: strategy.name(),
            dry_run,
            planned: plan.delete_labels().into_iter().map(str::to_string).collect(),
            deleted: Vec::new(),
            retained_due_to_dependency: plan.retained_due_to_dependency.clone(),
            unknown_labels: plan.unknown_labels.clone(),
            partial_failures: Vec::new(),
        }
    }

    /// Turn the report into the command's result.
    ///
    /// Partial deletions take precedence over unknown labels.
    pub fn into_result(self) -> Result<Self> {
        if !self.partial_failures.is_empty() {
            return Err(Error::PartialPrune(
                self.partial_failures.into_iter().map(|f| f.label).collect(),
            ));
        }
        if !self.unknown_labels.is_empty() {
            return Err(Error::UnknownLabel(self.unknown_labels));
        }
        Ok(self)
    }
}

/// Executes prune plans against the engine and ledger
#[derive(Clone)]
pub struct PruningEngine {
    ledger: Arc<dyn Ledger>,
    engine: Arc<dyn Engine>,
    leases: JobLeaseManager,
    resolver: ChainResolver,
    label_template: Option<String>,
}

impl PruningEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        engine: Arc<dyn Engine>,
        leases: JobLeaseManager,
        resolver: ChainResolver,
        label_template: Option<String>,
    ) -> Self {
        Self {
            ledger,
            engine,
            leases,
            resolver,
            label_template,
        }
    }

    /// Plan without side effects
    pub async fn plan(&self, group: Option<&str>, strategy: &PruneStrategy) -> Result<PrunePlan> {
        let history = self.resolver.history().await?;
        Ok(plan(&history, group, strategy))
    }

    /// Plan and, unless dry-run, delete.
    ///
    /// Unknown snapshot labels are reported and the known ones still
    /// deleted; [`PruneReport::into_result`] turns them into `UnknownLabel`.
    /// Per-backup failures are marked FAILED_PARTIAL_PRUNE and the remaining
    /// deletions continue.
    #[instrument(skip(self, request), fields(strategy = request.strategy.name(), group = ?request.group, dry_run = request.dry_run))]
    pub async fn prune(&self, request: &PruneRequest) -> Result<PruneReport> {
        let group = request.group.as_deref();
        let initial = self.plan(group, &request.strategy).await?;
        let mut report = PruneReport::from_plan(&request.strategy, request.dry_run, &initial);

        for retained in &initial.retained_due_to_dependency {
            info!(
                label = %retained.label,
                dependents = ?retained.dependents,
                "Retained: still needed by a retained incremental backup"
            );
        }

        if !initial.unknown_labels.is_empty() {
            warn!(unknown = ?initial.unknown_labels, "Unknown snapshot labels are skipped");
        }
        if request.dry_run || initial.delete.is_empty() {
            info!(planned = report.planned.len(), "Prune plan computed, nothing deleted");
            return Ok(report);
        }

        let scope = Scope::prune(group);
        let base_label = LabelGenerator::default().render(
            self.label_template.as_deref(),
            &LabelContext {
                scope: group.unwrap_or("all"),
                date: Utc::now().date_naive(),
                kind: "prune",
            },
        )?;
        let lease = self.leases.acquire(&scope, &base_label).await?;

        // History may have moved between planning and acquiring the lease
        let plan = match self.plan(group, &request.strategy).await {
            Ok(plan) => plan,
            Err(e) => {
                self.leases.release_or_warn(lease, LeaseOutcome::Failed).await;
                return Err(e);
            }
        };
        report = PruneReport::from_plan(&request.strategy, false, &plan);

        for record in &plan.delete {
            match self.delete_one(&record.label).await {
                Ok(()) => report.deleted.push(record.label.clone()),
                Err(reason) => report.partial_failures.push(PartialFailure {
                    label: record.label.clone(),
                    reason,
                }),
            }
        }

        let outcome = if report.partial_failures.is_empty() {
            LeaseOutcome::Finished
        } else {
            LeaseOutcome::Failed
        };
        self.leases.release_or_warn(lease, outcome).await;

        PRUNE_BACKUPS_TOTAL
            .with_label_values(&["deleted"])
            .inc_by(report.deleted.len() as u64);
        PRUNE_BACKUPS_TOTAL
            .with_label_values(&["retained"])
            .inc_by(report.retained_due_to_dependency.len() as u64);
        PRUNE_BACKUPS_TOTAL
            .with_label_values(&["partial"])
            .inc_by(report.partial_failures.len() as u64);
        OPERATIONS_TOTAL
            .with_label_values(&["prune", if outcome == LeaseOutcome::Finished { "finished" } else { "failed" }])
            .inc();

        info!(
            deleted = report.deleted.len(),
            partial = report.partial_failures.len(),
            retained = report.retained_due_to_dependency.len(),
            "Prune complete"
        );
        Ok(report)
    }

    /// Drop the snapshot, then its ledger rows.
    ///
    /// On failure the record is marked FAILED_PARTIAL_PRUNE and the reason
    /// is returned.
    async fn delete_one(&self, label: &str) -> std::result::Result<(), String> {
        let outcome = async {
            self.engine.drop_snapshot(label).await?;
            self.ledger
                .delete_backup(label)
                .await
                .map_err(|e| map_storage_error(e, "delete backup record"))?;
            Ok::<_, Error>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                info!(label, "Backup pruned");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                error!(label, error = %reason, "Prune of backup failed, manual reconciliation needed");
                if let Err(mark_err) = self.ledger.mark_partial_prune(label, &reason).await {
                    error!(label, error = %mark_err, "Failed to mark backup FAILED_PARTIAL_PRUNE");
                }
                Err(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> PruneReport {
        PruneReport {
            strategy: "snapshots",
            dry_run: false,
            planned: vec![],
            deleted: vec![],
            retained_due_to_dependency: vec![],
            unknown_labels: vec![],
            partial_failures: vec![],
        }
    }

    #[test]
    fn test_partial_failure_wins_over_unknown() {
        let mut r = report();
        r.unknown_labels = vec!["ghost".to_string()];
        r.partial_failures = vec![PartialFailure {
            label: "a".to_string(),
            reason: "drop failed".to_string(),
        }];
        assert_eq!(r.into_result().unwrap_err(), Error::PartialPrune(vec!["a".to_string()]));
    }

    #[test]
    fn test_unknown_labels_fail() {
        let mut r = report();
        r.unknown_labels = vec!["ghost".to_string()];
        assert_eq!(r.into_result().unwrap_err().kind(), "UnknownLabel");
    }

    #[test]
    fn test_clean_report_is_ok() {
        assert!(report().into_result().is_ok());
    }
}
