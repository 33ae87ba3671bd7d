//! Vaultline CLI tool

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vaultline_core::BackupType;
use vaultline_runtime::{BackupRequest, PartitionRestoreRequest, RestoreRequest};

mod commands;
mod config;
mod confirm;

#[derive(Parser)]
#[command(name = "vaultline")]
#[command(author, version, about = "StarRocks backup and restore orchestration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(long, global = true, env = "VAULTLINE_CONFIG", default_value = "vaultline.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackupKind {
    Full,
    Incremental,
    Weekly,
    Monthly,
}

impl From<BackupKind> for BackupType {
    fn from(kind: BackupKind) -> Self {
        match kind {
            BackupKind::Full => BackupType::Full,
            BackupKind::Incremental => BackupType::Incremental,
            BackupKind::Weekly => BackupType::Weekly,
            BackupKind::Monthly => BackupType::Monthly,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger schema and load the table inventory
    Init,

    /// Take a backup of an inventory group
    Backup {
        #[arg(value_enum)]
        kind: BackupKind,

        /// Inventory group to back up
        #[arg(long)]
        group: String,

        /// Label or label template, e.g. "{group}_{yyyymmdd}_{type}"
        #[arg(long)]
        name: Option<String>,

        /// Explicit baseline for an incremental backup
        #[arg(long = "baseline-backup")]
        baseline_backup: Option<String>,

        /// Partitions changed within this many days (incremental only)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Restore a backup, replaying its incremental chain
    Restore {
        #[arg(long)]
        target_label: String,

        /// Restrict the restore to one inventory group
        #[arg(long)]
        group: Option<String>,

        /// Restrict the restore to one table (database.table)
        #[arg(long)]
        table: Option<String>,

        /// Restore into new tables named <table><suffix>
        #[arg(long)]
        rename_suffix: Option<String>,

        /// Restore label or template
        #[arg(long)]
        name: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Restore one partition of one table from a single backup
    RestorePartition {
        #[arg(long)]
        backup_label: String,

        /// database.table
        #[arg(long)]
        table: String,

        #[arg(long)]
        partition: String,

        #[arg(long)]
        rename_suffix: Option<String>,

        #[arg(short, long)]
        yes: bool,
    },

    /// Delete old backups from the repository and the ledger
    Prune {
        /// Limit pruning to one inventory group
        #[arg(long)]
        group: Option<String>,

        /// Keep the N most recent finished backups
        #[arg(long)]
        keep_last: Option<usize>,

        /// Delete backups finished before this timestamp ("YYYY-MM-DD HH:MM:SS" or RFC 3339)
        #[arg(long)]
        older_than: Option<String>,

        /// Delete one backup by label
        #[arg(long)]
        snapshot: Option<String>,

        /// Delete several backups by label
        #[arg(long, value_delimiter = ',')]
        snapshots: Option<Vec<String>>,

        /// Show what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,

        #[arg(short, long)]
        yes: bool,

        /// Print the prune report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recorded backups, newest first
    List {
        #[arg(long)]
        group: Option<String>,

        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Inspect and reclaim operation leases
    Leases {
        #[command(subcommand)]
        action: LeaseAction,
    },
}

#[derive(Subcommand)]
enum LeaseAction {
    /// Show active leases
    List,

    /// Release a lease left behind by a crashed run
    Reclaim {
        /// Lease scope, e.g. "backup:sales"
        #[arg(long)]
        scope: String,

        /// Reclaim even if the lease is not yet stale
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        std::process::exit(report(&err));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config.as_path();

    match cli.command {
        Commands::Init => commands::init::execute(config).await,
        Commands::Backup {
            kind,
            group,
            name,
            baseline_backup,
            days,
        } => {
            let mut request = BackupRequest::new(group, kind.into());
            request.name = name;
            request.baseline = baseline_backup;
            request.days = days;
            commands::backup::execute(config, request).await
        }
        Commands::Restore {
            target_label,
            group,
            table,
            rename_suffix,
            name,
            yes,
        } => {
            let request = RestoreRequest {
                target_label,
                group,
                table,
                rename_suffix,
                name,
            };
            commands::restore::execute(config, request, yes).await
        }
        Commands::RestorePartition {
            backup_label,
            table,
            partition,
            rename_suffix,
            yes,
        } => {
            let request = PartitionRestoreRequest {
                backup_label,
                table,
                partition,
                rename_suffix,
                name: None,
            };
            commands::restore_partition::execute(config, request, yes).await
        }
        Commands::Prune {
            group,
            keep_last,
            older_than,
            snapshot,
            snapshots,
            dry_run,
            yes,
            json,
        } => {
            let strategy = commands::prune::StrategyArgs {
                keep_last,
                older_than,
                snapshot,
                snapshots,
            };
            commands::prune::execute(config, group, strategy, dry_run, yes, json).await
        }
        Commands::List { group, limit } => commands::list::execute(config, group, limit).await,
        Commands::Leases { action } => match action {
            LeaseAction::List => commands::leases::list(config).await,
            LeaseAction::Reclaim { scope, force } => {
                commands::leases::reclaim(config, &scope, force).await
            }
        },
    }
}

/// Print the error and return the process exit code
fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<vaultline_runtime::Error>() {
        Some(known) => {
            eprintln!("error[{}]: {}", known.kind(), known);
            known.exit_code()
        }
        None => {
            eprintln!("error: {:#}", err);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_older_than_help_matches_finish_time_cutoff() {
        let cli = Cli::command();
        let prune = cli
            .find_subcommand("prune")
            .expect("prune subcommand is defined");
        let older_than = prune
            .get_arguments()
            .find(|arg| arg.get_id() == "older_than")
            .expect("--older-than is defined");
        let help = older_than
            .get_help()
            .map(ToString::to_string)
            .unwrap_or_default();
        assert!(help.contains("finished before"), "help was: {}", help);
    }

    #[test]
    fn test_snapshots_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "vaultline",
            "prune",
            "--snapshots",
            "a,b,c",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Prune { snapshots, dry_run, .. } => {
                assert_eq!(snapshots.unwrap(), vec!["a", "b", "c"]);
                assert!(dry_run);
            }
            _ => panic!("expected prune"),
        }
    }

    #[test]
    fn test_restore_accepts_group_and_table_together() {
        // The ambiguity is reported by the runner with its own exit code
        let cli = Cli::try_parse_from([
            "vaultline",
            "restore",
            "--target-label",
            "x",
            "--group",
            "sales",
            "--table",
            "sales_db.orders",
        ]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_runtime_errors_keep_their_exit_code() {
        let err = anyhow::Error::new(vaultline_runtime::Error::AmbiguousScope);
        assert_eq!(report(&err), 2);
        let err = anyhow::anyhow!("plain failure");
        assert_eq!(report(&err), 1);
    }
}
