//! Assertions over ledger state

use vaultline_storage::Ledger;

/// Panics if any lease is still ACTIVE
pub async fn assert_no_active_leases(ledger: &dyn Ledger) {
    let active = ledger
        .list_active_leases()
        .await
        .expect("Failed to list active leases");
    assert!(
        active.is_empty(),
        "expected no active leases, found: {:?}",
        active.iter().map(|l| (&l.scope, &l.label)).collect::<Vec<_>>()
    );
}

/// Panics unless the backup exists with `status`
pub async fn assert_backup_status(ledger: &dyn Ledger, label: &str, status: &str) {
    let record = ledger
        .get_backup(label)
        .await
        .expect("Failed to load backup")
        .unwrap_or_else(|| panic!("backup '{}' not found", label));
    assert_eq!(record.status, status, "unexpected status for backup '{}'", label);
}

/// Panics if the backup still has a ledger row
pub async fn assert_backup_absent(ledger: &dyn Ledger, label: &str) {
    let record = ledger.get_backup(label).await.expect("Failed to load backup");
    assert!(record.is_none(), "backup '{}' should have been deleted", label);
}
