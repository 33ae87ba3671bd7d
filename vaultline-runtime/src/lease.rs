//! Job lease management
//!
//! A lease is the exclusive claim on a scope for one invocation. Acquiring
//! it also reserves the operation's label in the same ledger transaction.
//! `release` consumes the handle, so a lease is released at most once;
//! callers release on every path after a successful acquire.

use crate::metrics::LEASE_CONFLICTS_TOTAL;
use crate::{map_storage_error, Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use vaultline_core::{LeaseOutcome, Scope, MAX_REVISIONS};
use vaultline_storage::{Ledger, ReservationRequest, RunLeaseModel};

/// Proof of an ACTIVE lease held by this process
#[derive(Debug)]
pub struct LeaseHandle {
    id: Uuid,
    scope: Scope,
    label: String,
    acquired_at: DateTime<Utc>,
}

impl LeaseHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Label reserved together with the lease
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

/// Acquires and releases leases through the ledger
#[derive(Clone)]
pub struct JobLeaseManager {
    ledger: Arc<dyn Ledger>,
    max_revisions: u32,
}

impl JobLeaseManager {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            max_revisions: MAX_REVISIONS,
        }
    }

    pub fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions.max(1);
        self
    }

    /// Take the scope and reserve a label derived from `base_label`.
    ///
    /// A held scope fails immediately with `LeaseConflict`; there is no retry.
    #[instrument(skip(self, scope), fields(scope = %scope))]
    pub async fn acquire(&self, scope: &Scope, base_label: &str) -> Result<LeaseHandle> {
        let request = ReservationRequest {
            scope: scope.to_string(),
            base_label: base_label.to_string(),
            max_revisions: self.max_revisions,
        };

        let lease = self.ledger.reserve(&request).await.map_err(|e| {
            let err = map_storage_error(e, "acquire lease");
            if matches!(err, Error::LeaseConflict { .. }) {
                LEASE_CONFLICTS_TOTAL.inc();
            }
            err
        })?;

        info!(label = %lease.label, lease_id = %lease.id, "Lease acquired");
        Ok(LeaseHandle {
            id: lease.id,
            scope: scope.clone(),
            label: lease.label,
            acquired_at: lease.acquired_at,
        })
    }

    /// Release a lease with its outcome
    #[instrument(skip(self, handle), fields(scope = %handle.scope, label = %handle.label))]
    pub async fn release(&self, handle: LeaseHandle, outcome: LeaseOutcome) -> Result<()> {
        let released = self
            .ledger
            .release_lease(handle.id, outcome.as_str())
            .await
            .map_err(|e| map_storage_error(e, "release lease"))?;

        if released {
            info!(outcome = outcome.as_str(), "Lease released");
        } else {
            // Reclaimed by an operator while we were running
            warn!(outcome = outcome.as_str(), "Lease was no longer active at release");
        }
        Ok(())
    }

    /// Release on a path that already carries a result; a failed release is
    /// logged with the lease id so the operator can reclaim it.
    pub async fn release_or_warn(&self, handle: LeaseHandle, outcome: LeaseOutcome) {
        let (id, scope, label) = (handle.id, handle.scope.to_string(), handle.label.clone());
        if let Err(e) = self.release(handle, outcome).await {
            warn!(
                lease_id = %id,
                scope = %scope,
                label = %label,
                error = %e,
                "Failed to release lease; run `vaultline leases reclaim` for this scope"
            );
        }
    }

    pub async fn active_leases(&self) -> Result<Vec<RunLeaseModel>> {
        self.ledger
            .list_active_leases()
            .await
            .map_err(|e| map_storage_error(e, "list active leases"))
    }

    /// Administrative stale-lease reclaim.
    ///
    /// Without `force`, only leases older than `stale_after` are released.
    #[instrument(skip(self, scope), fields(scope = %scope))]
    pub async fn reclaim(
        &self,
        scope: &Scope,
        stale_after: Duration,
        force: bool,
    ) -> Result<RunLeaseModel> {
        let scope_key = scope.to_string();
        let active = self
            .ledger
            .get_active_lease(&scope_key)
            .await
            .map_err(|e| map_storage_error(e, "load active lease"))?
            .ok_or_else(|| Error::NotFound(format!("no active lease on scope '{}'", scope_key)))?;

        let now = Utc::now();
        let cutoff = if force {
            // Anything acquired up to now qualifies
            now + ChronoDuration::seconds(1)
        } else {
            let stale_after = ChronoDuration::from_std(stale_after)
                .map_err(|e| Error::InvalidInput(format!("stale lease threshold: {}", e)))?;
            now - stale_after
        };

        if active.acquired_at >= cutoff {
            return Err(Error::InvalidInput(format!(
                "lease '{}' on scope '{}' was acquired at {} and is not stale yet; use --force to override",
                active.label, scope_key, active.acquired_at
            )));
        }

        let reclaimed = self
            .ledger
            .reclaim_lease(&scope_key, cutoff)
            .await
            .map_err(|e| map_storage_error(e, "reclaim lease"))?
            .ok_or_else(|| {
                Error::NotFound(format!("lease on scope '{}' was released concurrently", scope_key))
            })?;

        warn!(label = %reclaimed.label, force, "Lease reclaimed by operator");
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultline_storage::InMemoryLedger;

    fn manager() -> (Arc<InMemoryLedger>, JobLeaseManager) {
        let ledger = Arc::new(InMemoryLedger::new());
        (ledger.clone(), JobLeaseManager::new(ledger))
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let (ledger, leases) = manager();
        let scope = Scope::backup("sales");

        let handle = leases.acquire(&scope, "sales_20250101_full").await.unwrap();
        assert_eq!(handle.label(), "sales_20250101_full");

        let err = leases.acquire(&scope, "other").await.unwrap_err();
        assert_eq!(err.kind(), "LeaseConflict");

        leases.release(handle, LeaseOutcome::Finished).await.unwrap();
        assert!(ledger.list_active_leases().await.unwrap().is_empty());

        let again = leases.acquire(&scope, "sales_20250101_full").await.unwrap();
        assert_eq!(again.label(), "sales_20250101_full_r2");
    }

    #[tokio::test]
    async fn test_reclaim_requires_staleness_or_force() {
        let (_, leases) = manager();
        let scope = Scope::backup("sales");
        leases.acquire(&scope, "crashed").await.unwrap();

        let err = leases
            .reclaim(&scope, Duration::from_secs(3600), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let reclaimed = leases
            .reclaim(&scope, Duration::from_secs(3600), true)
            .await
            .unwrap();
        assert_eq!(reclaimed.label, "crashed");
        assert!(leases.active_leases().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reclaim_without_active_lease() {
        let (_, leases) = manager();
        let err = leases
            .reclaim(&Scope::backup("idle"), Duration::from_secs(1), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
