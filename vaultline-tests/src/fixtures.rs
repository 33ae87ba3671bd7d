//! Test data factories for vaultline ledger rows
//!
//! Provides pre-built rows with sensible defaults.
//! Use these for quick test setup without needing to specify every field.

use chrono::{Duration, Utc};
use vaultline_storage::models::{BackupRecordModel, InventoryModel, PartitionDetailModel};

/// Inventory fixture factories
pub mod inventory {
    use super::*;

    /// A single table, eligible for every backup kind
    pub fn table(group: &str, database: &str, table: &str) -> InventoryModel {
        InventoryModel {
            inventory_group: group.to_string(),
            database_name: database.to_string(),
            table_name: table.to_string(),
            incremental_eligible: true,
            weekly_eligible: true,
            monthly_eligible: true,
        }
    }

    /// Every table of a database
    pub fn wildcard(group: &str, database: &str) -> InventoryModel {
        table(group, database, "*")
    }

    /// A table only FULL backups pick up
    pub fn full_only(group: &str, database: &str, name: &str) -> InventoryModel {
        let mut entry = table(group, database, name);
        entry.incremental_eligible = false;
        entry.weekly_eligible = false;
        entry.monthly_eligible = false;
        entry
    }
}

/// Backup history fixture factories
pub mod backup {
    use super::*;

    /// A FINISHED full backup that started `age_days` ago
    pub fn full(label: &str, group: &str, age_days: i64) -> BackupRecordModel {
        finished(label, "FULL", group, age_days, None)
    }

    /// A FINISHED incremental backup on top of `baseline`
    pub fn incremental(label: &str, group: &str, baseline: &str, age_days: i64) -> BackupRecordModel {
        finished(label, "INCREMENTAL", group, age_days, Some(baseline))
    }

    /// A FINISHED backup of any kind
    pub fn finished(
        label: &str,
        backup_type: &str,
        group: &str,
        age_days: i64,
        baseline: Option<&str>,
    ) -> BackupRecordModel {
        let started_at = Utc::now() - Duration::days(age_days);
        BackupRecordModel {
            label: label.to_string(),
            backup_type: backup_type.to_string(),
            inventory_group: group.to_string(),
            status: "FINISHED".to_string(),
            started_at,
            finished_at: Some(started_at + Duration::minutes(5)),
            error_message: None,
            baseline_label: baseline.map(str::to_string),
        }
    }

    /// Copy of `record` with another status; open statuses clear `finished_at`
    pub fn with_status(mut record: BackupRecordModel, status: &str) -> BackupRecordModel {
        if matches!(status, "PENDING" | "RUNNING") {
            record.finished_at = None;
        }
        record.status = status.to_string();
        record
    }
}

/// Partition detail fixture factories
pub mod partition {
    use super::*;

    pub fn row(label: &str, database: &str, table: &str, partition: &str) -> PartitionDetailModel {
        PartitionDetailModel {
            label: label.to_string(),
            database_name: database.to_string(),
            table_name: table.to_string(),
            partition_name: partition.to_string(),
            row_count: 1000,
            data_size_bytes: 64 * 1024,
        }
    }

    /// One row per partition name
    pub fn rows(label: &str, database: &str, table: &str, partitions: &[&str]) -> Vec<PartitionDetailModel> {
        partitions
            .iter()
            .map(|p| row(label, database, table, p))
            .collect()
    }
}
