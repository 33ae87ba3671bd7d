//! In-memory ledger
//!
//! Single-process ledger with the same contract as [`PostgresLedger`]:
//! one mutex guards all tables, so `reserve` is atomic with respect to every
//! other caller in the process. Used by tests and local dry runs.
//!
//! [`PostgresLedger`]: crate::PostgresLedger

use crate::ledger::{holder_description, BackupFilter, Ledger, ReservationRequest};
use crate::{models::*, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;
use vaultline_core::{scopes_conflict, BackupStatus, LabelGenerator, LeaseState};

#[derive(Debug, Default)]
struct State {
    /// Keyed by (group, database, table)
    inventory: BTreeMap<(String, String, String), InventoryModel>,
    leases: Vec<RunLeaseModel>,
    backups: BTreeMap<String, BackupRecordModel>,
    partitions: Vec<PartitionDetailModel>,
    restores: BTreeMap<String, RestoreRecordModel>,
    /// Labels whose delete_backup call fails (test hook)
    failing_deletes: HashSet<String>,
    /// When set, release_lease fails and leaves the lease ACTIVE (test hook)
    failing_releases: bool,
}

impl State {
    fn label_taken(&self, label: &str) -> bool {
        self.backups.contains_key(label)
            || self.restores.contains_key(label)
            || self.leases.iter().any(|l| l.label == label)
    }

    fn active_lease(&self, scope: &str) -> Option<&RunLeaseModel> {
        self.leases
            .iter()
            .find(|l| l.scope == scope && l.state == LeaseState::Active.as_str())
    }

    /// First ACTIVE lease whose scope excludes `scope`
    fn conflicting_lease(&self, scope: &str) -> Option<&RunLeaseModel> {
        self.leases.iter().find(|l| {
            l.state == LeaseState::Active.as_str() && scopes_conflict(&l.scope, scope)
        })
    }
}

/// Ledger kept entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `delete_backup(label)` fail with an internal error
    pub fn fail_deletes_for(&self, label: &str) {
        self.state.lock().failing_deletes.insert(label.to_string());
    }

    /// Make every later `release_lease` fail with an internal error
    pub fn fail_lease_releases(&self) {
        self.state.lock().failing_releases = true;
    }

    /// Every lease row, active or released, in acquisition order
    pub fn all_leases(&self) -> Vec<RunLeaseModel> {
        self.state.lock().leases.clone()
    }

    fn parse_status(status: &str) -> Result<BackupStatus> {
        BackupStatus::try_from(status).map_err(|e| Error::ValidationError(e.to_string()))
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_inventory(&self, entries: &[InventoryModel]) -> Result<u64> {
        let mut state = self.state.lock();
        for entry in entries {
            let key = (
                entry.inventory_group.clone(),
                entry.database_name.clone(),
                entry.table_name.clone(),
            );
            state.inventory.insert(key, entry.clone());
        }
        Ok(entries.len() as u64)
    }

    async fn list_inventory(&self, group: &str) -> Result<Vec<InventoryModel>> {
        let state = self.state.lock();
        Ok(state
            .inventory
            .values()
            .filter(|e| e.inventory_group == group)
            .cloned()
            .collect())
    }

    async fn reserve(&self, request: &ReservationRequest) -> Result<RunLeaseModel> {
        let mut state = self.state.lock();

        if let Some(holder) = state.conflicting_lease(&request.scope) {
            return Err(Error::LeaseConflict {
                scope: request.scope.clone(),
                holder: holder_description(holder, &request.scope),
            });
        }

        let label = LabelGenerator::new(request.max_revisions)
            .resolve(&request.base_label, |candidate| state.label_taken(candidate))?;

        let lease = RunLeaseModel {
            id: Uuid::new_v4(),
            scope: request.scope.clone(),
            label,
            state: LeaseState::Active.as_str().to_string(),
            outcome: None,
            acquired_at: Utc::now(),
            released_at: None,
        };
        state.leases.push(lease.clone());
        Ok(lease)
    }

    async fn release_lease(&self, id: Uuid, outcome: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if state.failing_releases {
            return Err(Error::Internal(format!("injected release failure for lease {}", id)));
        }
        let lease = state
            .leases
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::NotFound(format!("lease {}", id)))?;

        if lease.state != LeaseState::Active.as_str() {
            return Ok(false);
        }
        lease.state = LeaseState::Released.as_str().to_string();
        lease.outcome = Some(outcome.to_string());
        lease.released_at = Some(Utc::now());
        Ok(true)
    }

    async fn get_active_lease(&self, scope: &str) -> Result<Option<RunLeaseModel>> {
        Ok(self.state.lock().active_lease(scope).cloned())
    }

    async fn list_active_leases(&self) -> Result<Vec<RunLeaseModel>> {
        let state = self.state.lock();
        Ok(state
            .leases
            .iter()
            .filter(|l| l.state == LeaseState::Active.as_str())
            .cloned()
            .collect())
    }

    async fn reclaim_lease(
        &self,
        scope: &str,
        acquired_before: DateTime<Utc>,
    ) -> Result<Option<RunLeaseModel>> {
        let mut state = self.state.lock();
        let lease = state.leases.iter_mut().find(|l| {
            l.scope == scope
                && l.state == LeaseState::Active.as_str()
                && l.acquired_at < acquired_before
        });

        Ok(lease.map(|lease| {
            lease.state = LeaseState::Released.as_str().to_string();
            lease.outcome = Some("RECLAIMED".to_string());
            lease.released_at = Some(Utc::now());
            lease.clone()
        }))
    }

    async fn label_exists(&self, label: &str) -> Result<bool> {
        Ok(self.state.lock().label_taken(label))
    }

    async fn insert_backup(&self, record: &BackupRecordModel) -> Result<()> {
        Self::parse_status(&record.status)?;
        let mut state = self.state.lock();
        if state.backups.contains_key(&record.label) {
            return Err(Error::AlreadyExists(format!("backup '{}'", record.label)));
        }
        state.backups.insert(record.label.clone(), record.clone());
        Ok(())
    }

    async fn mark_backup_running(&self, label: &str, baseline_label: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        let record = state
            .backups
            .get_mut(label)
            .ok_or_else(|| Error::NotFound(format!("backup '{}'", label)))?;

        if record.status != BackupStatus::Pending.as_str() {
            return Err(Error::InvalidTransition(format!(
                "backup '{}' is not PENDING",
                label
            )));
        }
        record.status = BackupStatus::Running.as_str().to_string();
        record.baseline_label = baseline_label.map(str::to_string);
        Ok(())
    }

    async fn finalize_backup(
        &self,
        label: &str,
        status: &str,
        error_message: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        Self::parse_status(status)?;
        let mut state = self.state.lock();
        let record = state
            .backups
            .get_mut(label)
            .ok_or_else(|| Error::NotFound(format!("backup '{}'", label)))?;

        if !Self::parse_status(&record.status)?.is_in_flight() {
            return Err(Error::InvalidTransition(format!(
                "backup '{}' is already {}",
                label, record.status
            )));
        }
        record.status = status.to_string();
        record.error_message = error_message.map(str::to_string);
        record.finished_at = Some(finished_at);
        Ok(())
    }

    async fn get_backup(&self, label: &str) -> Result<Option<BackupRecordModel>> {
        Ok(self.state.lock().backups.get(label).cloned())
    }

    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupRecordModel>> {
        let state = self.state.lock();
        let mut records: Vec<BackupRecordModel> = state
            .backups
            .values()
            .filter(|r| filter.group.as_ref().map_or(true, |g| &r.inventory_group == g))
            .filter(|r| filter.status.as_ref().map_or(true, |s| &r.status == s))
            .cloned()
            .collect();

        records.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.label.cmp(&a.label))
        });
        if let Some(limit) = filter.limit {
            records.truncate(limit.max(0) as usize);
        }
        Ok(records)
    }

    async fn insert_partitions(&self, rows: &[PartitionDetailModel]) -> Result<()> {
        let mut state = self.state.lock();
        for row in rows {
            if !state.backups.contains_key(&row.label) {
                return Err(Error::NotFound(format!("backup '{}'", row.label)));
            }
        }
        for row in rows {
            state.partitions.retain(|p| {
                !(p.label == row.label
                    && p.database_name == row.database_name
                    && p.table_name == row.table_name
                    && p.partition_name == row.partition_name)
            });
            state.partitions.push(row.clone());
        }
        Ok(())
    }

    async fn list_partitions(&self, label: &str) -> Result<Vec<PartitionDetailModel>> {
        let state = self.state.lock();
        let mut rows: Vec<PartitionDetailModel> = state
            .partitions
            .iter()
            .filter(|p| p.label == label)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.database_name, &a.table_name, &a.partition_name).cmp(&(
                &b.database_name,
                &b.table_name,
                &b.partition_name,
            ))
        });
        Ok(rows)
    }

    async fn delete_backup(&self, label: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if state.failing_deletes.contains(label) {
            return Err(Error::Internal(format!(
                "injected delete failure for '{}'",
                label
            )));
        }
        let removed = state.backups.remove(label).is_some();
        state.partitions.retain(|p| p.label != label);
        Ok(removed)
    }

    async fn mark_partial_prune(&self, label: &str, error_message: &str) -> Result<()> {
        let mut state = self.state.lock();
        let record = state
            .backups
            .get_mut(label)
            .ok_or_else(|| Error::NotFound(format!("backup '{}'", label)))?;
        record.status = BackupStatus::FailedPartialPrune.as_str().to_string();
        record.error_message = Some(error_message.to_string());
        Ok(())
    }

    async fn insert_restore(&self, record: &RestoreRecordModel) -> Result<()> {
        Self::parse_status(&record.status)?;
        let mut state = self.state.lock();
        if state.restores.contains_key(&record.restore_label) {
            return Err(Error::AlreadyExists(format!(
                "restore '{}'",
                record.restore_label
            )));
        }
        state
            .restores
            .insert(record.restore_label.clone(), record.clone());
        Ok(())
    }

    async fn finalize_restore(
        &self,
        restore_label: &str,
        status: &str,
        error_message: Option<&str>,
        verification_checksum: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        Self::parse_status(status)?;
        let mut state = self.state.lock();
        let record = state
            .restores
            .get_mut(restore_label)
            .ok_or_else(|| Error::NotFound(format!("restore '{}'", restore_label)))?;

        if !Self::parse_status(&record.status)?.is_in_flight() {
            return Err(Error::InvalidTransition(format!(
                "restore '{}' is already {}",
                restore_label, record.status
            )));
        }
        record.status = status.to_string();
        record.error_message = error_message.map(str::to_string);
        record.verification_checksum = verification_checksum.map(str::to_string);
        record.finished_at = Some(finished_at);
        Ok(())
    }

    async fn get_restore(&self, restore_label: &str) -> Result<Option<RestoreRecordModel>> {
        Ok(self.state.lock().restores.get(restore_label).cloned())
    }

    async fn list_restores(&self, limit: i64) -> Result<Vec<RestoreRecordModel>> {
        let state = self.state.lock();
        let mut records: Vec<RestoreRecordModel> = state.restores.values().cloned().collect();
        records.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.restore_label.cmp(&a.restore_label))
        });
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn request(scope: &str, base: &str) -> ReservationRequest {
        ReservationRequest {
            scope: scope.to_string(),
            base_label: base.to_string(),
            max_revisions: 1000,
        }
    }

    fn pending_backup(label: &str) -> BackupRecordModel {
        BackupRecordModel {
            label: label.to_string(),
            backup_type: "FULL".to_string(),
            inventory_group: "sales".to_string(),
            status: "PENDING".to_string(),
            started_at: Utc::now(),
            finished_at: None,
            error_message: None,
            baseline_label: None,
        }
    }

    #[tokio::test]
    async fn test_reserve_conflicts_on_active_scope() {
        let ledger = InMemoryLedger::new();
        let lease = ledger.reserve(&request("backup:sales", "base")).await.unwrap();
        assert_eq!(lease.label, "base");

        let err = ledger
            .reserve(&request("backup:sales", "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LeaseConflict { ref holder, .. } if holder == "base"));

        assert!(ledger.release_lease(lease.id, "FINISHED").await.unwrap());
        assert!(!ledger.release_lease(lease.id, "FINISHED").await.unwrap());

        // Scope free again, and the old label stays taken
        let next = ledger.reserve(&request("backup:sales", "base")).await.unwrap();
        assert_eq!(next.label, "base_r2");
    }

    #[tokio::test]
    async fn test_prune_reservation_conflicts_with_group_work() {
        let ledger = InMemoryLedger::new();
        let backup = ledger.reserve(&request("backup:sales", "inc")).await.unwrap();

        let err = ledger
            .reserve(&request("prune:sales", "sales_prune"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LeaseConflict { ref scope, ref holder }
                if scope == "prune:sales" && holder == "inc on backup:sales"
        ));
        assert!(ledger.reserve(&request("prune:all", "all_prune")).await.is_err());

        // Other groups and restores of the same group are unaffected
        ledger.reserve(&request("prune:finance", "finance_prune")).await.unwrap();
        ledger.reserve(&request("restore:sales", "sales_restore")).await.unwrap();

        ledger.release_lease(backup.id, "FINISHED").await.unwrap();
        let err = ledger
            .reserve(&request("prune:sales", "sales_prune"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LeaseConflict { ref holder, .. } if holder.ends_with("restore:sales")));
    }

    #[tokio::test]
    async fn test_concurrent_reserve_single_winner() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.reserve(&request("backup:sales", "base")).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(Error::LeaseConflict { .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(ledger.list_active_leases().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reserve_distinct_labels_across_scopes() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .reserve(&request(&format!("backup:g{}", i), "shared"))
                    .await
                    .unwrap()
                    .label
            }));
        }

        let mut labels = HashSet::new();
        for handle in handles {
            assert!(labels.insert(handle.await.unwrap()));
        }
        assert_eq!(labels.len(), 20);
    }

    #[tokio::test]
    async fn test_label_exhaustion() {
        let ledger = InMemoryLedger::new();
        let small = |scope: &str| ReservationRequest {
            scope: scope.to_string(),
            base_label: "busy".to_string(),
            max_revisions: 2,
        };
        ledger.reserve(&small("backup:a")).await.unwrap();
        ledger.reserve(&small("backup:b")).await.unwrap();
        let err = ledger.reserve(&small("backup:c")).await.unwrap_err();
        assert!(matches!(err, Error::LabelExhausted(ref base) if base == "busy"));
    }

    #[tokio::test]
    async fn test_reclaim_only_older_leases() {
        let ledger = InMemoryLedger::new();
        ledger.reserve(&request("backup:sales", "x")).await.unwrap();

        let cutoff_past = Utc::now() - chrono::Duration::hours(1);
        assert!(ledger
            .reclaim_lease("backup:sales", cutoff_past)
            .await
            .unwrap()
            .is_none());

        let cutoff_future = Utc::now() + chrono::Duration::seconds(1);
        let reclaimed = ledger
            .reclaim_lease("backup:sales", cutoff_future)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reclaimed.outcome.as_deref(), Some("RECLAIMED"));
        assert!(ledger.get_active_lease("backup:sales").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finalize_only_once() {
        let ledger = InMemoryLedger::new();
        ledger.insert_backup(&pending_backup("b1")).await.unwrap();
        ledger.mark_backup_running("b1", None).await.unwrap();
        ledger
            .finalize_backup("b1", "FINISHED", None, Utc::now())
            .await
            .unwrap();

        let err = ledger
            .finalize_backup("b1", "FAILED", Some("late"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        assert_eq!(ledger.get_backup("b1").await.unwrap().unwrap().status, "FINISHED");
    }

    #[tokio::test]
    async fn test_delete_cascades_partitions() {
        let ledger = InMemoryLedger::new();
        ledger.insert_backup(&pending_backup("b1")).await.unwrap();
        ledger
            .insert_partitions(&[PartitionDetailModel {
                label: "b1".to_string(),
                database_name: "sales_db".to_string(),
                table_name: "orders".to_string(),
                partition_name: "p20250101".to_string(),
                row_count: 10,
                data_size_bytes: 1024,
            }])
            .await
            .unwrap();

        assert!(ledger.delete_backup("b1").await.unwrap());
        assert!(ledger.list_partitions("b1").await.unwrap().is_empty());
        assert!(!ledger.delete_backup("b1").await.unwrap());
    }

    #[tokio::test]
    async fn test_partitions_require_parent_backup() {
        let ledger = InMemoryLedger::new();
        let err = ledger
            .insert_partitions(&[PartitionDetailModel {
                label: "ghost".to_string(),
                database_name: "d".to_string(),
                table_name: "t".to_string(),
                partition_name: "p".to_string(),
                row_count: 0,
                data_size_bytes: 0,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
