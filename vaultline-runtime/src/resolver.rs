//! Ledger-backed chain resolution
//!
//! Loads backup history fresh on every call and delegates to the pure
//! resolution in `vaultline_core::chain`, so answers never outlive the
//! ledger state they were computed from.

use crate::{map_storage_error, Result};
use std::sync::Arc;
use tracing::{debug, instrument};
use vaultline_core::{BackupRecord, BaselinePolicy, History};
use vaultline_storage::{BackupFilter, Ledger};

#[derive(Clone)]
pub struct ChainResolver {
    ledger: Arc<dyn Ledger>,
    policy: BaselinePolicy,
}

impl ChainResolver {
    pub fn new(ledger: Arc<dyn Ledger>, policy: BaselinePolicy) -> Self {
        Self { ledger, policy }
    }

    pub fn policy(&self) -> &BaselinePolicy {
        &self.policy
    }

    /// Current backup history across all groups
    pub async fn history(&self) -> Result<History> {
        let models = self
            .ledger
            .list_backups(&BackupFilter::default())
            .await
            .map_err(|e| map_storage_error(e, "load backup history"))?;

        let records = models
            .into_iter()
            .map(BackupRecord::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(History::new(records))
    }

    /// Baseline for an incremental backup of `group`.
    ///
    /// An explicit label is validated; otherwise the most recent finished
    /// backup the policy accepts is chosen.
    #[instrument(skip(self))]
    pub async fn baseline_for(&self, group: &str, explicit: Option<&str>) -> Result<BackupRecord> {
        let history = self.history().await?;
        let baseline = match explicit {
            Some(label) => history.validate_baseline(label, group)?,
            None => history.latest_baseline(group, &self.policy)?,
        };
        debug!(baseline = %baseline.label, "Baseline resolved");
        Ok(baseline.clone())
    }

    /// Ordered chain, root first, that reconstructs `target`
    #[instrument(skip(self))]
    pub async fn restore_chain(&self, target: &str) -> Result<Vec<BackupRecord>> {
        let history = self.history().await?;
        let chain: Vec<BackupRecord> = history
            .resolve_chain(target)?
            .into_iter()
            .cloned()
            .collect();
        debug!(steps = chain.len(), "Restore chain resolved");
        Ok(chain)
    }
}
