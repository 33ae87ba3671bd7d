//! Typed ledger entities
//!
//! Storage keeps status and kind columns as plain strings; these are the
//! typed views the planners operate on.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of backup operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupType {
    Full,
    Incremental,
    Weekly,
    Monthly,
}

impl BackupType {
    /// Canonical ledger literal
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "FULL",
            BackupType::Incremental => "INCREMENTAL",
            BackupType::Weekly => "WEEKLY",
            BackupType::Monthly => "MONTHLY",
        }
    }

    /// Short token used in generated labels
    pub fn label_token(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Incremental => "inc",
            BackupType::Weekly => "weekly",
            BackupType::Monthly => "monthly",
        }
    }

    /// Whether a backup of this kind is self-contained (can root a chain)
    pub fn is_standalone(&self) -> bool {
        !matches!(self, BackupType::Incremental)
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for BackupType {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(BackupType::Full),
            "incremental" | "inc" => Ok(BackupType::Incremental),
            "weekly" => Ok(BackupType::Weekly),
            "monthly" => Ok(BackupType::Monthly),
            _ => Err(Error::InvalidValue(format!("Unknown backup type: {}", s))),
        }
    }
}

/// Lifecycle status of a backup record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupStatus {
    Pending,
    Running,
    /// Canonical terminal success. `SUCCESS` is accepted as a historical alias when parsing.
    Finished,
    Failed,
    Cancelled,
    /// Snapshot drop and ledger purge disagreed; needs manual reconciliation.
    FailedPartialPrune,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "PENDING",
            BackupStatus::Running => "RUNNING",
            BackupStatus::Finished => "FINISHED",
            BackupStatus::Failed => "FAILED",
            BackupStatus::Cancelled => "CANCELLED",
            BackupStatus::FailedPartialPrune => "FAILED_PARTIAL_PRUNE",
        }
    }

    /// Record may still be finalized
    pub fn is_in_flight(&self) -> bool {
        matches!(self, BackupStatus::Pending | BackupStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_flight()
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for BackupStatus {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(BackupStatus::Pending),
            "RUNNING" => Ok(BackupStatus::Running),
            "FINISHED" | "SUCCESS" => Ok(BackupStatus::Finished),
            "FAILED" => Ok(BackupStatus::Failed),
            "CANCELLED" => Ok(BackupStatus::Cancelled),
            "FAILED_PARTIAL_PRUNE" => Ok(BackupStatus::FailedPartialPrune),
            _ => Err(Error::InvalidValue(format!("Unknown backup status: {}", s))),
        }
    }
}

/// Restore records share the backup lifecycle minus the prune-only state
pub type RestoreStatus = BackupStatus;

/// State of a run lease row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
    Active,
    Released,
}

impl LeaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseState::Active => "ACTIVE",
            LeaseState::Released => "RELEASED",
        }
    }
}

impl TryFrom<&str> for LeaseState {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(LeaseState::Active),
            "RELEASED" => Ok(LeaseState::Released),
            _ => Err(Error::InvalidValue(format!("Unknown lease state: {}", s))),
        }
    }
}

/// How a lease ended, stored alongside the RELEASED transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseOutcome {
    Finished,
    Failed,
    Cancelled,
    Reclaimed,
}

impl LeaseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseOutcome::Finished => "FINISHED",
            LeaseOutcome::Failed => "FAILED",
            LeaseOutcome::Cancelled => "CANCELLED",
            LeaseOutcome::Reclaimed => "RECLAIMED",
        }
    }
}

/// One row of the operator-maintained table inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub group: String,
    pub database: String,
    /// Table name, or `*` for every table in the database
    pub table: String,
    pub incremental_eligible: bool,
    pub weekly_eligible: bool,
    pub monthly_eligible: bool,
}

impl InventoryEntry {
    pub fn is_wildcard(&self) -> bool {
        self.table == "*"
    }

    /// Whether this entry participates in a backup of the given kind
    pub fn eligible_for(&self, backup_type: BackupType) -> bool {
        match backup_type {
            BackupType::Full => true,
            BackupType::Incremental => self.incremental_eligible,
            BackupType::Weekly => self.weekly_eligible,
            BackupType::Monthly => self.monthly_eligible,
        }
    }

    /// Whether `database.table` is covered by this entry
    pub fn covers(&self, database: &str, table: &str) -> bool {
        self.database == database && (self.is_wildcard() || self.table == table)
    }
}

/// Backup history row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub label: String,
    pub backup_type: BackupType,
    pub group: String,
    pub status: BackupStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub baseline_label: Option<String>,
}

impl BackupRecord {
    pub fn is_finished(&self) -> bool {
        self.status == BackupStatus::Finished
    }
}

/// Partition captured by a backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDetail {
    pub label: String,
    pub database: String,
    pub table: String,
    pub partition: String,
    pub row_count: i64,
    pub data_size_bytes: i64,
}

/// Restore history row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRecord {
    pub restore_label: String,
    pub target_backup_label: String,
    pub scope: String,
    pub scope_filter: Option<String>,
    pub status: RestoreStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub verification_checksum: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_alias_for_finished() {
        assert_eq!(BackupStatus::try_from("SUCCESS"), Ok(BackupStatus::Finished));
        assert_eq!(BackupStatus::try_from("success"), Ok(BackupStatus::Finished));
        assert_eq!(BackupStatus::Finished.as_str(), "FINISHED");
    }

    #[test]
    fn test_backup_type_parsing() {
        assert_eq!(BackupType::try_from("inc"), Ok(BackupType::Incremental));
        assert_eq!(BackupType::try_from("MONTHLY"), Ok(BackupType::Monthly));
        assert!(BackupType::try_from("hourly").is_err());
    }

    #[test]
    fn test_inventory_eligibility_and_wildcard() {
        let entry = InventoryEntry {
            group: "sales".to_string(),
            database: "sales_db".to_string(),
            table: "*".to_string(),
            incremental_eligible: false,
            weekly_eligible: true,
            monthly_eligible: true,
        };

        assert!(entry.eligible_for(BackupType::Full));
        assert!(!entry.eligible_for(BackupType::Incremental));
        assert!(entry.covers("sales_db", "orders"));
        assert!(!entry.covers("other_db", "orders"));
    }
}
