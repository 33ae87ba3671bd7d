//! Converters between ledger models and typed core records.

use crate::models::*;
use vaultline_core::{
    BackupRecord, BackupStatus, BackupType, InventoryEntry, PartitionDetail, RestoreRecord,
};

impl TryFrom<BackupRecordModel> for BackupRecord {
    type Error = vaultline_core::Error;

    fn try_from(model: BackupRecordModel) -> vaultline_core::Result<Self> {
        let backup_type: BackupType = model.backup_type.as_str().try_into()?;
        let status: BackupStatus = model.status.as_str().try_into()?;
        Ok(Self {
            label: model.label,
            backup_type,
            group: model.inventory_group,
            status,
            started_at: model.started_at,
            finished_at: model.finished_at,
            error_message: model.error_message,
            baseline_label: model.baseline_label,
        })
    }
}

impl From<&BackupRecord> for BackupRecordModel {
    fn from(record: &BackupRecord) -> Self {
        Self {
            label: record.label.clone(),
            backup_type: record.backup_type.as_str().to_string(),
            inventory_group: record.group.clone(),
            status: record.status.as_str().to_string(),
            started_at: record.started_at,
            finished_at: record.finished_at,
            error_message: record.error_message.clone(),
            baseline_label: record.baseline_label.clone(),
        }
    }
}

impl From<InventoryModel> for InventoryEntry {
    fn from(model: InventoryModel) -> Self {
        Self {
            group: model.inventory_group,
            database: model.database_name,
            table: model.table_name,
            incremental_eligible: model.incremental_eligible,
            weekly_eligible: model.weekly_eligible,
            monthly_eligible: model.monthly_eligible,
        }
    }
}

impl From<&InventoryEntry> for InventoryModel {
    fn from(entry: &InventoryEntry) -> Self {
        Self {
            inventory_group: entry.group.clone(),
            database_name: entry.database.clone(),
            table_name: entry.table.clone(),
            incremental_eligible: entry.incremental_eligible,
            weekly_eligible: entry.weekly_eligible,
            monthly_eligible: entry.monthly_eligible,
        }
    }
}

impl From<PartitionDetailModel> for PartitionDetail {
    fn from(model: PartitionDetailModel) -> Self {
        Self {
            label: model.label,
            database: model.database_name,
            table: model.table_name,
            partition: model.partition_name,
            row_count: model.row_count,
            data_size_bytes: model.data_size_bytes,
        }
    }
}

impl From<&PartitionDetail> for PartitionDetailModel {
    fn from(detail: &PartitionDetail) -> Self {
        Self {
            label: detail.label.clone(),
            database_name: detail.database.clone(),
            table_name: detail.table.clone(),
            partition_name: detail.partition.clone(),
            row_count: detail.row_count,
            data_size_bytes: detail.data_size_bytes,
        }
    }
}

impl TryFrom<RestoreRecordModel> for RestoreRecord {
    type Error = vaultline_core::Error;

    fn try_from(model: RestoreRecordModel) -> vaultline_core::Result<Self> {
        let status: BackupStatus = model.status.as_str().try_into()?;
        Ok(Self {
            restore_label: model.restore_label,
            target_backup_label: model.target_backup_label,
            scope: model.scope,
            scope_filter: model.scope_filter,
            status,
            started_at: model.started_at,
            finished_at: model.finished_at,
            error_message: model.error_message,
            verification_checksum: model.verification_checksum,
        })
    }
}

impl From<&RestoreRecord> for RestoreRecordModel {
    fn from(record: &RestoreRecord) -> Self {
        Self {
            restore_label: record.restore_label.clone(),
            target_backup_label: record.target_backup_label.clone(),
            scope: record.scope.clone(),
            scope_filter: record.scope_filter.clone(),
            status: record.status.as_str().to_string(),
            started_at: record.started_at,
            finished_at: record.finished_at,
            error_message: record.error_message.clone(),
            verification_checksum: record.verification_checksum.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn model(status: &str) -> BackupRecordModel {
        BackupRecordModel {
            label: "sales_20250101_inc".to_string(),
            backup_type: "INCREMENTAL".to_string(),
            inventory_group: "sales".to_string(),
            status: status.to_string(),
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            error_message: None,
            baseline_label: Some("sales_20241231_full".to_string()),
        }
    }

    #[test]
    fn test_model_to_record_normalises_success_alias() {
        let record: BackupRecord = model("SUCCESS").try_into().expect("conversion should work");
        assert_eq!(record.status, BackupStatus::Finished);
        assert_eq!(record.backup_type, BackupType::Incremental);
        assert_eq!(record.group, "sales");

        let back: BackupRecordModel = (&record).into();
        assert_eq!(back.status, "FINISHED");
        assert_eq!(back.baseline_label, record.baseline_label);
    }

    #[test]
    fn test_invalid_status_is_rejected() {
        let result: vaultline_core::Result<BackupRecord> = model("bogus").try_into();
        assert!(matches!(result, Err(vaultline_core::Error::InvalidValue(_))));
    }
}
