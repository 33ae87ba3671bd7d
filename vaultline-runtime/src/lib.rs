//! # Vaultline Runtime
//!
//! Coordination layer: leases, chain resolution against the ledger, pruning
//! execution and the operation runner that drives the engine from dispatch
//! to a recorded outcome.

pub mod lease;
pub mod metrics;
pub mod polling;
pub mod pruning;
pub mod resolver;
pub mod runner;
pub mod state_machine;

// Re-export commonly used types
pub use lease::{JobLeaseManager, LeaseHandle};
pub use polling::PollPolicy;
pub use pruning::{PartialFailure, PruneReport, PruneRequest, PruningEngine};
pub use resolver::ChainResolver;
pub use runner::{
    BackupOutcome, BackupRequest, OperationRunner, PartitionRestoreRequest, RestoreOutcome,
    RestoreRequest, RunnerConfig,
};
pub use state_machine::{OperationState, StateMachine};

use tracing::error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for runtime operations, one variant per reported kind
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    #[error("Another operation is running on scope '{scope}' (lease '{holder}')")]
    LeaseConflict { scope: String, holder: String },

    #[error("No free label for base '{0}'")]
    LabelExhausted(String),

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

    #[error("At most one of group or table may be given for a restore")]
    AmbiguousScope,

    #[error("Invalid pruning strategy: {0}")]
    InvalidStrategy(String),

    #[error("Unknown backup label(s): {}", .0.join(", "))]
    UnknownLabel(Vec<String>),

    #[error("Operation '{label}' did not finish within {waited_secs}s; it may still be running in the engine")]
    Timeout { label: String, waited_secs: u64 },

    #[error("Prune left {} backup(s) needing manual reconciliation: {}", .0.len(), .0.join(", "))]
    PartialPrune(Vec<String>),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine operation failed: {0}")]
    EngineFailed(String),

    #[error("Operation '{label}' was cancelled in the engine")]
    EngineCancelled { label: String },

    #[error("Nothing to back up for group '{group}'")]
    NothingToBackup { group: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Error kind name shown to operators
    pub fn kind(&self) -> &'static str {
        match self {
            Error::LeaseConflict { .. } => "LeaseConflict",
            Error::LabelExhausted(_) => "LabelExhausted",
            Error::NoBaseline { .. } => "NoBaseline",
            Error::BaselineNotFound(_) => "BaselineNotFound",
            Error::BaselineMismatch { .. } => "BaselineMismatch",
            Error::BrokenChain { .. } => "BrokenChain",
            Error::AmbiguousScope => "AmbiguousScope",
            Error::InvalidStrategy(_) => "InvalidStrategy",
            Error::UnknownLabel(_) => "UnknownLabel",
            Error::Timeout { .. } => "Timeout",
            Error::PartialPrune(_) => "FAILED_PARTIAL_PRUNE",
            Error::EngineUnavailable(_) => "EngineUnavailable",
            Error::EngineFailed(_) => "EngineFailed",
            Error::EngineCancelled { .. } => "EngineCancelled",
            Error::NothingToBackup { .. } => "NothingToBackup",
            Error::InvalidInput(_) => "InvalidInput",
            Error::NotFound(_) => "NotFound",
            Error::Ledger(_) => "LedgerError",
            Error::Internal(_) => "Internal",
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::AmbiguousScope | Error::InvalidStrategy(_) | Error::InvalidInput(_) => 2,
            Error::LeaseConflict { .. } => 3,
            Error::PartialPrune(_) => 4,
            _ => 1,
        }
    }

    /// Whether the error was raised before any ledger mutation
    pub fn is_validation(&self) -> bool {
        self.exit_code() == 2
    }
}

impl From<vaultline_core::Error> for Error {
    fn from(err: vaultline_core::Error) -> Self {
        use vaultline_core::Error as CoreError;

        match err {
            CoreError::LabelExhausted(base) => Error::LabelExhausted(base),
            CoreError::NoBaseline { group } => Error::NoBaseline { group },
            CoreError::BaselineNotFound(label) => Error::BaselineNotFound(label),
            CoreError::BaselineMismatch {
                label,
                expected,
                actual,
            } => Error::BaselineMismatch {
                label,
                expected,
                actual,
            },
            CoreError::BrokenChain { label, reason } => Error::BrokenChain { label, reason },
            CoreError::AmbiguousScope => Error::AmbiguousScope,
            CoreError::InvalidStrategy(msg) => Error::InvalidStrategy(msg),
            CoreError::UnknownLabel(labels) => Error::UnknownLabel(labels),
            CoreError::InvalidLabel(msg) | CoreError::InvalidValue(msg) => Error::InvalidInput(msg),
        }
    }
}

impl From<vaultline_core::EngineError> for Error {
    fn from(err: vaultline_core::EngineError) -> Self {
        use vaultline_core::EngineError;

        match err {
            EngineError::Unavailable(msg) => Error::EngineUnavailable(msg),
            EngineError::Command(msg) | EngineError::Protocol(msg) => Error::EngineFailed(msg),
        }
    }
}

/// Map storage errors to runtime errors, preserving semantic meaning
///
/// - LeaseConflict, LabelExhausted, NotFound keep their kind
/// - ValidationError becomes InvalidInput
/// - everything else becomes a Ledger error carrying the context
pub fn map_storage_error(e: vaultline_storage::Error, context: &str) -> Error {
    use vaultline_storage::Error as StorageError;

    match e {
        StorageError::LeaseConflict { scope, holder } => {
            tracing::warn!(scope = %scope, holder = %holder, context = %context, "Lease conflict");
            Error::LeaseConflict { scope, holder }
        }
        StorageError::LabelExhausted(base) => {
            error!(base = %base, context = %context, "Label revisions exhausted");
            Error::LabelExhausted(base)
        }
        StorageError::NotFound(msg) => {
            error!(error = %msg, context = %context, "Ledger record not found");
            Error::NotFound(msg)
        }
        StorageError::ValidationError(msg) => {
            error!(error = %msg, context = %context, "Ledger validation error");
            Error::InvalidInput(msg)
        }
        other => {
            let err_msg = format!("{}: {}", context, other);
            error!(error = %err_msg, "Ledger error");
            Error::Ledger(err_msg)
        }
    }
}
