//! Single-partition restore command

use super::Session;
use crate::confirm::confirm;
use anyhow::Result;
use std::path::Path;
use vaultline_runtime::PartitionRestoreRequest;

pub async fn execute(config_path: &Path, request: PartitionRestoreRequest, yes: bool) -> Result<()> {
    let session = Session::open(config_path).await?;

    println!(
        "Restoring partition {} of {} from {}",
        request.partition, request.table, request.backup_label
    );
    if !yes && !confirm("Proceed with partition restore?")? {
        println!("Restore cancelled");
        return Ok(());
    }

    let outcome = session.runner.restore_partition(request).await?;

    println!("Restore finished");
    println!("Restore label: {}", outcome.restore_label);
    println!("Verification checksum: {}", outcome.verification_checksum);
    Ok(())
}
