//! Database engine capability
//!
//! The analytical database performs the actual snapshotting. Vaultline only
//! issues operations, polls them, and drops snapshots through this trait.

use crate::types::BackupType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result type for engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors reported by an engine implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Cluster or repository cannot be reached
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    /// The engine rejected or failed a command
    #[error("Engine command failed: {0}")]
    Command(String),

    /// The engine answered with something we could not interpret
    #[error("Unexpected engine response: {0}")]
    Protocol(String),
}

/// A table (optionally narrowed to partitions) inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotObject {
    pub database: String,
    pub table: String,
    /// Empty means the whole table
    pub partitions: Vec<String>,
}

impl SnapshotObject {
    pub fn whole_table(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            partitions: Vec::new(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

/// Everything the engine needs to start a backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDescriptor {
    pub label: String,
    pub backup_type: BackupType,
    pub objects: Vec<SnapshotObject>,
    /// Set for incremental backups
    pub baseline_label: Option<String>,
}

/// Everything the engine needs to restore one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreDescriptor {
    /// Label of the restore operation
    pub restore_label: String,
    /// Snapshot being applied
    pub snapshot_label: String,
    /// Empty means every object in the snapshot
    pub objects: Vec<SnapshotObject>,
    /// Appended to every restored table name
    pub rename_suffix: Option<String>,
}

/// Reference to an operation started on the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub label: String,
    /// Database the engine tracks the job under
    pub database: String,
    pub kind: HandleKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Backup,
    Restore,
}

/// Engine-side job state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EngineState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Running => "RUNNING",
            EngineState::Finished => "FINISHED",
            EngineState::Failed => "FAILED",
            EngineState::Cancelled => "CANCELLED",
        }
    }
}

/// Answer to a status poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub state: EngineState,
    pub error_detail: Option<String>,
}

impl StatusReport {
    pub fn running() -> Self {
        Self {
            state: EngineState::Running,
            error_detail: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            state: EngineState::Finished,
            error_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            state: EngineState::Failed,
            error_detail: Some(detail.into()),
        }
    }
}

/// Partition metadata reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub name: String,
    pub row_count: i64,
    pub data_size_bytes: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Native snapshot capability of the database
#[async_trait]
pub trait Engine: Send + Sync {
    /// Start a backup; returns as soon as the engine accepted it
    async fn execute_backup(&self, descriptor: &BackupDescriptor) -> EngineResult<OperationHandle>;

    /// Start restoring one snapshot
    async fn execute_restore(&self, descriptor: &RestoreDescriptor)
        -> EngineResult<OperationHandle>;

    /// Current state of a started operation
    async fn poll_status(&self, handle: &OperationHandle) -> EngineResult<StatusReport>;

    /// Delete a snapshot from the repository
    async fn drop_snapshot(&self, label: &str) -> EngineResult<()>;

    /// Whether the configured backup repository exists
    async fn repository_exists(&self) -> EngineResult<bool>;

    /// Whether the cluster can take new jobs
    async fn cluster_healthy(&self) -> EngineResult<bool>;

    /// Base tables of a database
    async fn list_tables(&self, database: &str) -> EngineResult<Vec<String>>;

    /// Partitions of a table, optionally only those modified since a point in time
    async fn list_partitions(
        &self,
        database: &str,
        table: &str,
        changed_since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<PartitionInfo>>;
}
