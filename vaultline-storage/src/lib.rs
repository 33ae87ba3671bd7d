//! # Vaultline Storage
//!
//! The backup ledger: table inventory, run leases, and backup/restore
//! history with partition detail. Every cross-process guarantee vaultline
//! makes (one active lease per scope, globally unique labels) is enforced
//! here by the store itself rather than by in-process locks.

pub mod converters;
pub mod ledger;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;

// Re-export commonly used types
pub use ledger::{BackupFilter, Ledger, ReservationRequest};
pub use memory::InMemoryLedger;
pub use models::{
    BackupRecordModel, InventoryModel, PartitionDetailModel, RestoreRecordModel, RunLeaseModel,
};
pub use postgres::{PoolConfig, PostgresLedger};

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Scope '{scope}' is held by active lease '{holder}'")]
    LeaseConflict { scope: String, holder: String },

    #[error("No free label for base '{0}'")]
    LabelExhausted(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<vaultline_core::Error> for Error {
    fn from(err: vaultline_core::Error) -> Self {
        match err {
            vaultline_core::Error::LabelExhausted(base) => Error::LabelExhausted(base),
            other => Error::ValidationError(other.to_string()),
        }
    }
}
