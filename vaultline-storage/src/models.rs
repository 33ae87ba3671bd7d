//! Database models for the backup ledger
//!
//! Status and kind columns are plain strings here; `vaultline-runtime`
//! converts them into the typed `vaultline-core` records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Inventory row maintained by the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct InventoryModel {
    pub inventory_group: String,
    pub database_name: String,
    pub table_name: String,
    pub incremental_eligible: bool,
    pub weekly_eligible: bool,
    pub monthly_eligible: bool,
}

/// Run lease row; `label` is the operation label reserved with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RunLeaseModel {
    pub id: Uuid,
    pub scope: String,
    pub label: String,
    pub state: String,
    pub outcome: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

/// Backup history row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BackupRecordModel {
    pub label: String,
    pub backup_type: String,
    pub inventory_group: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub baseline_label: Option<String>,
}

/// Partition captured by a backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PartitionDetailModel {
    pub label: String,
    pub database_name: String,
    pub table_name: String,
    pub partition_name: String,
    pub row_count: i64,
    pub data_size_bytes: i64,
}

/// Restore history row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RestoreRecordModel {
    pub restore_label: String,
    pub target_backup_label: String,
    pub scope: String,
    pub scope_filter: Option<String>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub verification_checksum: Option<String>,
}
