//! Initialize command

use super::Session;
use anyhow::Result;
use std::path::Path;

/// Create the ledger schema and load the configured inventory
pub async fn execute(config_path: &Path) -> Result<()> {
    let session = Session::open(config_path).await?;
    let entries = session.config.inventory_entries();
    tracing::info!(entries = entries.len(), "Initializing vaultline ledger");

    let written = session.runner.initialize(&entries).await?;

    let mut groups: Vec<&str> = entries.iter().map(|e| e.group.as_str()).collect();
    groups.sort_unstable();
    groups.dedup();

    println!("Ledger initialized");
    println!("Inventory entries: {}", written);
    if !groups.is_empty() {
        println!("Groups: {}", groups.join(", "));
    }
    Ok(())
}
