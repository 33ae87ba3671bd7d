//! # Vaultline Core
//!
//! Domain model and pure planning logic for vaultline, an orchestrator for
//! native snapshot backup and restore on clustered analytical databases.
//!
//! Nothing in this crate performs I/O. Ledger access lives in
//! `vaultline-storage`, coordination in `vaultline-runtime`, and the database
//! side of every operation sits behind the [`Engine`] trait.

pub mod chain;
pub mod engine;
pub mod labels;
pub mod prune;
pub mod scope;
pub mod types;

// Re-export commonly used types
pub use chain::{BaselinePolicy, History, MAX_CHAIN_DEPTH};
pub use engine::{
    BackupDescriptor, Engine, EngineError, EngineResult, EngineState, HandleKind,
    OperationHandle, PartitionInfo, RestoreDescriptor, SnapshotObject, StatusReport,
};
pub use labels::{LabelContext, LabelGenerator, DEFAULT_TEMPLATE, MAX_REVISIONS};
pub use prune::{PrunePlan, PruneStrategy, RetainedBackup};
pub use scope::{scopes_conflict, OperationKind, RestoreScope, Scope};
pub use types::{
    BackupRecord, BackupStatus, BackupType, InventoryEntry, LeaseOutcome, LeaseState,
    PartitionDetail, RestoreRecord, RestoreStatus,
};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for core planning operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("No free label for base '{0}' after exhausting revision suffixes")]
    LabelExhausted(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("No finished baseline backup found for group '{group}'")]
    NoBaseline { group: String },

    #[error("Baseline backup '{0}' not found or not finished")]
    BaselineNotFound(String),

    #[error("Baseline backup '{label}' belongs to group '{actual}', expected '{expected}'")]
    BaselineMismatch {
        label: String,
        expected: String,
        actual: String,
    },

    #[error("Broken backup chain at '{label}': {reason}")]
    BrokenChain { label: String, reason: String },

    #[error("Restore scope is ambiguous: at most one of group or table may be given")]
    AmbiguousScope,

    #[error("Invalid pruning strategy: {0}")]
    InvalidStrategy(String),

    #[error("Unknown backup label(s): {}", .0.join(", "))]
    UnknownLabel(Vec<String>),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
