//! Restore command

use super::Session;
use crate::confirm::confirm;
use anyhow::Result;
use std::path::Path;
use vaultline_core::RestoreScope;
use vaultline_runtime::RestoreRequest;

/// Restore a label by replaying its chain.
///
/// Returns without touching the ledger when the operator declines.
pub async fn execute(config_path: &Path, request: RestoreRequest, yes: bool) -> Result<()> {
    // Scope errors must surface before anything else
    let scope = RestoreScope::from_filters(request.group.as_deref(), request.table.as_deref())
        .map_err(vaultline_runtime::Error::from)?;

    let session = Session::open(config_path).await?;
    let chain = session.runner.resolver().restore_chain(&request.target_label).await?;
    let labels: Vec<&str> = chain.iter().map(|r| r.label.as_str()).collect();

    println!("Target: {}", request.target_label);
    println!("Scope: {}", scope.filter().unwrap_or_else(|| scope.as_str().to_string()));
    println!("Chain ({} step(s)): {}", labels.len(), labels.join(" -> "));
    if let Some(suffix) = &request.rename_suffix {
        println!("Tables restored with suffix '{}'", suffix);
    } else {
        println!("Existing tables will be overwritten");
    }

    if !yes && !confirm("Proceed with restore?")? {
        println!("Restore cancelled");
        return Ok(());
    }

    let outcome = session.runner.restore(request).await?;

    println!("Restore finished");
    println!("Restore label: {}", outcome.restore_label);
    println!("Applied: {}", outcome.steps.join(" -> "));
    println!("Verification checksum: {}", outcome.verification_checksum);
    Ok(())
}
