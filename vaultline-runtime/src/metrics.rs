//! Prometheus metrics for vaultline operations

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

lazy_static! {
    /// Completed operations
    ///
    /// Labels:
    /// - kind: "full", "inc", "weekly", "monthly", "restore", "restore_partition", "prune"
    /// - outcome: "finished", "failed", "cancelled"
    pub static ref OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "vaultline_operations_total",
        "Total number of completed operations",
        &["kind", "outcome"]
    )
    .expect("vaultline_operations_total metric registration");

    /// Lease acquisitions rejected because the scope was held
    pub static ref LEASE_CONFLICTS_TOTAL: IntCounter = register_int_counter!(
        "vaultline_lease_conflicts_total",
        "Total number of lease acquisitions rejected with a conflict"
    )
    .expect("vaultline_lease_conflicts_total metric registration");

    /// Prune results per backup
    ///
    /// Labels:
    /// - result: "deleted", "retained", "partial"
    pub static ref PRUNE_BACKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "vaultline_prune_backups_total",
        "Backups handled by prune runs",
        &["result"]
    )
    .expect("vaultline_prune_backups_total metric registration");

    /// Time spent waiting on the engine, in seconds
    ///
    /// Labels:
    /// - kind: "backup", "restore"
    pub static ref POLL_WAIT_SECONDS: HistogramVec = register_histogram_vec!(
        "vaultline_poll_wait_seconds",
        "Time spent polling the engine for a terminal state",
        &["kind"],
        vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 10800.0, 21600.0]
    )
    .expect("vaultline_poll_wait_seconds metric registration");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = OPERATIONS_TOTAL.with_label_values(&["full", "finished"]);
        let _ = PRUNE_BACKUPS_TOTAL.with_label_values(&["deleted"]);
        let _ = POLL_WAIT_SECONDS.with_label_values(&["backup"]);
        LEASE_CONFLICTS_TOTAL.inc();
    }
}
