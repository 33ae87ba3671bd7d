//! List command

use super::Session;
use anyhow::Result;
use std::path::Path;
use vaultline_storage::BackupFilter;

pub async fn execute(config_path: &Path, group: Option<String>, limit: i64) -> Result<()> {
    let session = Session::open(config_path).await?;
    let backups = session
        .ledger
        .list_backups(&BackupFilter {
            group,
            status: None,
            limit: Some(limit),
        })
        .await?;

    if backups.is_empty() {
        println!("No backups recorded");
        return Ok(());
    }

    println!(
        "{:<40} {:<12} {:<16} {:<22} {:<25} BASELINE",
        "LABEL", "TYPE", "GROUP", "STATUS", "STARTED"
    );
    for backup in backups {
        println!(
            "{:<40} {:<12} {:<16} {:<22} {:<25} {}",
            backup.label,
            backup.backup_type,
            backup.inventory_group,
            backup.status,
            backup.started_at.format("%Y-%m-%d %H:%M:%S"),
            backup.baseline_label.as_deref().unwrap_or("-")
        );
        if let Some(err) = backup.error_message {
            println!("    error: {}", err);
        }
    }
    Ok(())
}
