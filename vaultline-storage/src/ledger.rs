//! Ledger capability shared by the PostgreSQL and in-memory stores

use crate::models::*;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Atomic lease-plus-label reservation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    /// Conflict unit, `kind:target`
    pub scope: String,
    /// Rendered label before collision resolution
    pub base_label: String,
    /// Highest `_rN` suffix to try
    pub max_revisions: u32,
}

/// Holder named in a `LeaseConflict`; the scope is added when it differs
/// from the requested one.
pub(crate) fn holder_description(holder: &RunLeaseModel, requested_scope: &str) -> String {
    if holder.scope == requested_scope {
        holder.label.clone()
    } else {
        format!("{} on {}", holder.label, holder.scope)
    }
}

/// Filter for backup history listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupFilter {
    pub group: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

impl BackupFilter {
    pub fn group(group: impl Into<String>) -> Self {
        Self {
            group: Some(group.into()),
            ..Default::default()
        }
    }
}

/// Durable store for inventory, leases, and backup/restore history.
///
/// Listing methods return history newest first (`started_at` descending,
/// then label descending).
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Create the schema if missing; idempotent
    async fn ensure_schema(&self) -> Result<()>;

    async fn health_check(&self) -> Result<()>;

    // ========== Inventory ==========

    /// Insert or update inventory rows, returns the number written
    async fn upsert_inventory(&self, entries: &[InventoryModel]) -> Result<u64>;

    async fn list_inventory(&self, group: &str) -> Result<Vec<InventoryModel>>;

    // ========== Leases ==========

    /// Atomically check the scope is free, pick the first free label derived
    /// from the base, and insert an ACTIVE lease carrying it.
    ///
    /// Fails with `LeaseConflict` when an ACTIVE lease holds a conflicting
    /// scope (see `Scope::conflicts_with`) and with `LabelExhausted` when
    /// every revision is taken.
    async fn reserve(&self, request: &ReservationRequest) -> Result<RunLeaseModel>;

    /// Move an ACTIVE lease to RELEASED. Returns false when it was not active.
    async fn release_lease(&self, id: Uuid, outcome: &str) -> Result<bool>;

    async fn get_active_lease(&self, scope: &str) -> Result<Option<RunLeaseModel>>;

    async fn list_active_leases(&self) -> Result<Vec<RunLeaseModel>>;

    /// Force-release the ACTIVE lease of a scope if it was acquired before
    /// the cutoff. Returns the released lease.
    async fn reclaim_lease(
        &self,
        scope: &str,
        acquired_before: DateTime<Utc>,
    ) -> Result<Option<RunLeaseModel>>;

    /// Whether a label is used by any lease, backup, or restore
    async fn label_exists(&self, label: &str) -> Result<bool>;

    // ========== Backups ==========

    async fn insert_backup(&self, record: &BackupRecordModel) -> Result<()>;

    /// PENDING -> RUNNING, recording the baseline the backup was taken against
    async fn mark_backup_running(&self, label: &str, baseline_label: Option<&str>) -> Result<()>;

    /// Write the terminal status once; only PENDING or RUNNING records move
    async fn finalize_backup(
        &self,
        label: &str,
        status: &str,
        error_message: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_backup(&self, label: &str) -> Result<Option<BackupRecordModel>>;

    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupRecordModel>>;

    async fn insert_partitions(&self, rows: &[PartitionDetailModel]) -> Result<()>;

    async fn list_partitions(&self, label: &str) -> Result<Vec<PartitionDetailModel>>;

    /// Delete a backup and its partition rows in one unit. Returns false
    /// when no such backup exists.
    async fn delete_backup(&self, label: &str) -> Result<bool>;

    /// Flag a backup whose snapshot drop and ledger purge disagreed
    async fn mark_partial_prune(&self, label: &str, error_message: &str) -> Result<()>;

    // ========== Restores ==========

    async fn insert_restore(&self, record: &RestoreRecordModel) -> Result<()>;

    async fn finalize_restore(
        &self,
        restore_label: &str,
        status: &str,
        error_message: Option<&str>,
        verification_checksum: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get_restore(&self, restore_label: &str) -> Result<Option<RestoreRecordModel>>;

    async fn list_restores(&self, limit: i64) -> Result<Vec<RestoreRecordModel>>;
}
