//! CLI command implementations

pub mod backup;
pub mod init;
pub mod leases;
pub mod list;
pub mod prune;
pub mod restore;
pub mod restore_partition;

use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use vaultline_runtime::OperationRunner;
use vaultline_starrocks::StarRocksEngine;
use vaultline_storage::{Ledger, PostgresLedger};

/// Everything a command needs, built from the config file
pub struct Session {
    pub config: Config,
    pub ledger: Arc<dyn Ledger>,
    pub runner: OperationRunner,
}

impl Session {
    pub async fn open(config_path: &Path) -> Result<Self> {
        let config = Config::load(config_path)?;

        let database_url = config.database_url()?;
        let ledger: Arc<dyn Ledger> = Arc::new(
            PostgresLedger::with_pool_config(&database_url, config.pool_config())
                .await
                .context("Failed to connect to the ledger database")?,
        );

        let engine = StarRocksEngine::connect_lazy(&config.starrocks())
            .map_err(vaultline_runtime::Error::from)?;

        let runner = OperationRunner::new(
            ledger.clone(),
            Arc::new(engine),
            config.baseline_policy()?,
            config.runner_config(),
        );

        Ok(Self {
            config,
            ledger,
            runner,
        })
    }
}
