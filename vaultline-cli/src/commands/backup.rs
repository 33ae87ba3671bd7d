//! Backup command

use super::Session;
use anyhow::Result;
use std::path::Path;
use vaultline_runtime::BackupRequest;

pub async fn execute(config_path: &Path, request: BackupRequest) -> Result<()> {
    let session = Session::open(config_path).await?;
    tracing::info!(
        group = %request.group,
        backup_type = %request.backup_type,
        "Starting backup"
    );

    let outcome = session.runner.backup(request).await?;

    println!("Backup finished");
    println!("Label: {}", outcome.label);
    println!("Type: {}", outcome.backup_type);
    if let Some(baseline) = &outcome.baseline_label {
        println!("Baseline: {}", baseline);
    }
    println!("Tables: {}", outcome.tables);
    println!("Partitions: {}", outcome.partitions);
    Ok(())
}
