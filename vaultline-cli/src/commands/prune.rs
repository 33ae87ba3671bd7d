//! Prune command

use super::Session;
use crate::confirm::confirm;
use anyhow::Result;
use std::path::Path;
use vaultline_core::PruneStrategy;
use vaultline_runtime::{PruneReport, PruneRequest};

/// Strategy options as given on the command line
#[derive(Debug, Clone, Default)]
pub struct StrategyArgs {
    pub keep_last: Option<usize>,
    pub older_than: Option<String>,
    pub snapshot: Option<String>,
    pub snapshots: Option<Vec<String>>,
}

impl StrategyArgs {
    pub fn into_strategy(self) -> vaultline_runtime::Result<PruneStrategy> {
        Ok(PruneStrategy::from_options(
            self.keep_last,
            self.older_than.as_deref(),
            self.snapshot.as_deref(),
            self.snapshots.as_deref(),
        )?)
    }
}

pub async fn execute(
    config_path: &Path,
    group: Option<String>,
    strategy: StrategyArgs,
    dry_run: bool,
    yes: bool,
    json: bool,
) -> Result<()> {
    // Invalid strategies fail before connecting to anything
    let strategy = strategy.into_strategy()?;
    let session = Session::open(config_path).await?;
    let pruning = session.runner.pruning();

    let plan = pruning.plan(group.as_deref(), &strategy).await?;
    let preview = PruneRequest {
        group: group.clone(),
        strategy: strategy.clone(),
        dry_run: true,
    };

    if dry_run {
        let report = pruning.prune(&preview).await?;
        print_report(&report, json)?;
        return Ok(());
    }

    if plan.delete.is_empty() {
        let report = pruning.prune(&preview).await?;
        print_report(&report, json)?;
        report.into_result()?;
        return Ok(());
    }

    println!("Backups to delete ({}):", plan.delete.len());
    for record in &plan.delete {
        println!("  {} ({}, {})", record.label, record.backup_type, record.started_at);
    }
    if !yes && !confirm("Delete these backups?")? {
        println!("Prune cancelled");
        return Ok(());
    }

    let report = pruning
        .prune(&PruneRequest {
            group,
            strategy,
            dry_run: false,
        })
        .await?;
    print_report(&report, json)?;
    report.into_result()?;
    Ok(())
}

fn print_report(report: &PruneReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Strategy: {}", report.strategy);
    if report.dry_run {
        println!("Dry run: {} backup(s) would be deleted", report.planned.len());
        for label in &report.planned {
            println!("  {}", label);
        }
    } else {
        println!("Deleted: {}", report.deleted.len());
        for label in &report.deleted {
            println!("  {}", label);
        }
    }
    for retained in &report.retained_due_to_dependency {
        println!(
            "Retained {}: needed by {}",
            retained.label,
            retained.dependents.join(", ")
        );
    }
    for label in &report.unknown_labels {
        println!("Unknown label: {}", label);
    }
    if !report.partial_failures.is_empty() {
        println!("FAILED_PARTIAL_PRUNE, manual reconciliation required:");
        for failure in &report.partial_failures {
            println!("  {}: {}", failure.label, failure.reason);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_args_need_exactly_one_option() {
        let err = StrategyArgs::default().into_strategy().unwrap_err();
        assert_eq!(err.kind(), "InvalidStrategy");
        assert_eq!(err.exit_code(), 2);

        let both = StrategyArgs {
            keep_last: Some(3),
            snapshot: Some("x".to_string()),
            ..StrategyArgs::default()
        };
        assert!(both.into_strategy().is_err());

        let snapshots = StrategyArgs {
            snapshots: Some(vec!["a".to_string(), "b".to_string()]),
            ..StrategyArgs::default()
        };
        assert_eq!(
            snapshots.into_strategy().unwrap(),
            PruneStrategy::Snapshots(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_malformed_timestamp_is_invalid_strategy() {
        let args = StrategyArgs {
            older_than: Some("last tuesday".to_string()),
            ..StrategyArgs::default()
        };
        assert_eq!(args.into_strategy().unwrap_err().kind(), "InvalidStrategy");
    }
}
