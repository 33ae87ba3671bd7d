//! Lease inspection and administrative reclaim

use super::Session;
use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use vaultline_core::Scope;

pub async fn list(config_path: &Path) -> Result<()> {
    let session = Session::open(config_path).await?;
    let leases = session.runner.leases().active_leases().await?;

    if leases.is_empty() {
        println!("No active leases");
        return Ok(());
    }

    let now = Utc::now();
    for lease in leases {
        let held = now - lease.acquired_at;
        println!(
            "{:<30} {:<40} acquired {} ({}m ago)",
            lease.scope,
            lease.label,
            lease.acquired_at.format("%Y-%m-%d %H:%M:%S"),
            held.num_minutes()
        );
    }
    Ok(())
}

/// Release a lease left behind by a crashed process
pub async fn reclaim(config_path: &Path, scope: &str, force: bool) -> Result<()> {
    let scope = Scope::parse(scope).map_err(vaultline_runtime::Error::from)?;
    let session = Session::open(config_path).await?;

    let reclaimed = session
        .runner
        .leases()
        .reclaim(&scope, session.config.stale_lease_after(), force)
        .await?;

    println!("Reclaimed lease on {}", reclaimed.scope);
    println!("Label: {}", reclaimed.label);
    println!("Acquired: {}", reclaimed.acquired_at);
    Ok(())
}
