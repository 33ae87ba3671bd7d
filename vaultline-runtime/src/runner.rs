//! Operation runner
//!
//! Drives one backup or restore from request to recorded outcome:
//!
//! 1. validate the request (no I/O, no ledger mutation on failure)
//! 2. ensure the ledger schema and check the engine's repository and cluster
//! 3. acquire the scope lease, which also reserves the label
//! 4. write the PENDING ledger record
//! 5. build the descriptor, dispatch to the engine and poll
//! 6. finalize the record, then release the lease
//!
//! Every failure after step 3 is written to the ledger before the lease is
//! released, and the lease is released on every path.

use crate::lease::{JobLeaseManager, LeaseHandle};
use crate::metrics::OPERATIONS_TOTAL;
use crate::polling::{poll_until_terminal, PollPolicy};
use crate::pruning::PruningEngine;
use crate::resolver::ChainResolver;
use crate::state_machine::{OperationState, StateMachine};
use crate::{map_storage_error, Error, Result};
use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use vaultline_core::labels::sanitize;
use vaultline_core::scope::split_qualified_table;
use vaultline_core::{
    BackupDescriptor, BackupRecord, BackupStatus, BackupType, BaselinePolicy, Engine,
    EngineState, InventoryEntry, LabelContext, LabelGenerator, LeaseOutcome, PartitionDetail,
    RestoreDescriptor, RestoreScope, Scope, SnapshotObject, StatusReport,
};
use vaultline_storage::{
    BackupRecordModel, Ledger, PartitionDetailModel, RestoreRecordModel,
};

/// Tunables shared by every operation
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub poll: PollPolicy,
    /// Default label template when a request carries no name
    pub label_template: Option<String>,
    /// Window for incremental change detection when `--days` is absent
    pub incremental_lookback_days: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            label_template: None,
            incremental_lookback_days: 1,
        }
    }
}

/// Request to back up one inventory group
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub group: String,
    pub backup_type: BackupType,
    /// Base label or template; the configured template when absent
    pub name: Option<String>,
    /// Explicit baseline, incremental only
    pub baseline: Option<String>,
    /// Change window in days, incremental only
    pub days: Option<u32>,
}

impl BackupRequest {
    pub fn new(group: impl Into<String>, backup_type: BackupType) -> Self {
        Self {
            group: group.into(),
            backup_type,
            name: None,
            baseline: None,
            days: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    pub label: String,
    pub backup_type: BackupType,
    pub baseline_label: Option<String>,
    pub tables: usize,
    pub partitions: usize,
}

/// Request to restore a backup chain
#[derive(Debug, Clone, Default)]
pub struct RestoreRequest {
    pub target_label: String,
    pub group: Option<String>,
    /// `database.table`
    pub table: Option<String>,
    pub rename_suffix: Option<String>,
    pub name: Option<String>,
}

/// Request to restore a single partition from one backup
#[derive(Debug, Clone, Default)]
pub struct PartitionRestoreRequest {
    pub backup_label: String,
    /// `database.table`
    pub table: String,
    pub partition: String,
    pub rename_suffix: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub restore_label: String,
    pub target_label: String,
    /// Snapshot labels applied, root first
    pub steps: Vec<String>,
    pub verification_checksum: String,
}

/// Objects selected from one snapshot
#[derive(Debug)]
struct BackupSelection {
    objects: Vec<SnapshotObject>,
    partitions: Vec<PartitionDetail>,
}

/// One snapshot to apply during a restore
#[derive(Debug)]
struct RestoreStep {
    snapshot_label: String,
    objects: Vec<SnapshotObject>,
}

/// Top-level coordinator for backups and restores
#[derive(Clone)]
pub struct OperationRunner {
    ledger: Arc<dyn Ledger>,
    engine: Arc<dyn Engine>,
    leases: JobLeaseManager,
    resolver: ChainResolver,
    config: RunnerConfig,
}

impl OperationRunner {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        engine: Arc<dyn Engine>,
        policy: BaselinePolicy,
        config: RunnerConfig,
    ) -> Self {
        Self {
            leases: JobLeaseManager::new(ledger.clone()),
            resolver: ChainResolver::new(ledger.clone(), policy),
            ledger,
            engine,
            config,
        }
    }

    pub fn leases(&self) -> &JobLeaseManager {
        &self.leases
    }

    pub fn resolver(&self) -> &ChainResolver {
        &self.resolver
    }

    /// Pruning engine sharing this runner's ledger, engine and leases
    pub fn pruning(&self) -> PruningEngine {
        PruningEngine::new(
            self.ledger.clone(),
            self.engine.clone(),
            self.leases.clone(),
            self.resolver.clone(),
            self.config.label_template.clone(),
        )
    }

    /// Create the ledger schema and load inventory entries
    #[instrument(skip(self, inventory), fields(entries = inventory.len()))]
    pub async fn initialize(&self, inventory: &[InventoryEntry]) -> Result<u64> {
        self.ledger
            .ensure_schema()
            .await
            .map_err(|e| map_storage_error(e, "ensure schema"))?;

        let models: Vec<_> = inventory.iter().map(Into::into).collect();
        let written = self
            .ledger
            .upsert_inventory(&models)
            .await
            .map_err(|e| map_storage_error(e, "upsert inventory"))?;

        info!(written, "Ledger initialized");
        Ok(written)
    }

    // ========== Backup ==========

    /// Run a backup to completion
    #[instrument(skip(self, request), fields(group = %request.group, backup_type = %request.backup_type))]
    pub async fn backup(&self, request: BackupRequest) -> Result<BackupOutcome> {
        Self::validate_backup_request(&request)?;
        let mut machine = StateMachine::new();

        self.prepare().await?;

        let base_label = self.render_label(
            request.name.as_deref(),
            &request.group,
            request.backup_type.label_token(),
        )?;
        let lease = self
            .leases
            .acquire(&Scope::backup(&request.group), &base_label)
            .await?;
        advance(&mut machine, OperationState::LeaseHeld)?;
        let label = lease.label().to_string();

        // Resolved under the lease so the PENDING record already names its
        // baseline and prune planning sees the dependency
        let baseline = match request.backup_type {
            BackupType::Incremental => self
                .resolver
                .baseline_for(&request.group, request.baseline.as_deref())
                .await
                .map(Some),
            _ => Ok(None),
        };

        let record = BackupRecordModel {
            label: label.clone(),
            backup_type: request.backup_type.as_str().to_string(),
            inventory_group: request.group.clone(),
            status: BackupStatus::Pending.as_str().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            error_message: None,
            baseline_label: baseline
                .as_ref()
                .ok()
                .and_then(|b| b.as_ref().map(|b| b.label.clone())),
        };
        if let Err(e) = self.ledger.insert_backup(&record).await {
            let err = map_storage_error(e, "insert backup record");
            self.leases.release_or_warn(lease, LeaseOutcome::Failed).await;
            return Err(err);
        }
        advance(&mut machine, OperationState::LabelAssigned)?;
        info!(label = %label, baseline = ?record.baseline_label, "Backup started");

        let result = match baseline {
            Ok(baseline) => {
                self.execute_backup(&request, &label, baseline, &mut machine)
                    .await
            }
            Err(e) => Err(e),
        };

        let status = terminal_status(&result);
        let error_message = result.as_ref().err().map(ToString::to_string);
        let terminal = if status == BackupStatus::Finished {
            OperationState::Finished
        } else {
            OperationState::Failed
        };
        if let Err(e) = machine.transition(terminal) {
            warn!(label = %label, error = %e, "Operation state out of step with outcome");
        }

        let finalized = self
            .ledger
            .finalize_backup(&label, status.as_str(), error_message.as_deref(), Utc::now())
            .await
            .map_err(|e| map_storage_error(e, "finalize backup record"));

        self.leases.release_or_warn(lease, lease_outcome(status)).await;
        OPERATIONS_TOTAL
            .with_label_values(&[
                request.backup_type.label_token(),
                outcome_label(status),
            ])
            .inc();

        let outcome = result?;
        finalized?;
        info!(label = %label, tables = outcome.tables, "Backup finished");
        Ok(outcome)
    }

    fn validate_backup_request(request: &BackupRequest) -> Result<()> {
        if request.group.trim().is_empty() {
            return Err(Error::InvalidInput("group cannot be empty".to_string()));
        }
        if request.backup_type != BackupType::Incremental {
            if request.baseline.is_some() {
                return Err(Error::InvalidInput(
                    "--baseline-backup only applies to incremental backups".to_string(),
                ));
            }
            if request.days.is_some() {
                return Err(Error::InvalidInput(
                    "--days only applies to incremental backups".to_string(),
                ));
            }
        }
        if request.days == Some(0) {
            return Err(Error::InvalidInput("--days must be positive".to_string()));
        }
        Ok(())
    }

    async fn execute_backup(
        &self,
        request: &BackupRequest,
        label: &str,
        baseline: Option<BackupRecord>,
        machine: &mut StateMachine,
    ) -> Result<BackupOutcome> {
        let selection = self.select_backup_objects(request, label).await?;
        let descriptor = BackupDescriptor {
            label: label.to_string(),
            backup_type: request.backup_type,
            objects: selection.objects,
            baseline_label: baseline.as_ref().map(|b| b.label.clone()),
        };

        let handle = self.engine.execute_backup(&descriptor).await?;
        advance(machine, OperationState::Dispatched)?;

        let rows: Vec<PartitionDetailModel> = selection.partitions.iter().map(Into::into).collect();
        self.ledger
            .insert_partitions(&rows)
            .await
            .map_err(|e| map_storage_error(e, "record backup partitions"))?;
        self.ledger
            .mark_backup_running(label, descriptor.baseline_label.as_deref())
            .await
            .map_err(|e| map_storage_error(e, "mark backup running"))?;

        advance(machine, OperationState::Polling)?;
        let report = poll_until_terminal(self.engine.as_ref(), &handle, &self.config.poll).await?;
        ensure_finished(label, &report)?;

        Ok(BackupOutcome {
            label: label.to_string(),
            backup_type: request.backup_type,
            baseline_label: descriptor.baseline_label,
            tables: descriptor.objects.len(),
            partitions: rows.len(),
        })
    }

    /// Tables (and for incrementals, changed partitions) to snapshot
    async fn select_backup_objects(
        &self,
        request: &BackupRequest,
        label: &str,
    ) -> Result<BackupSelection> {
        let inventory: Vec<InventoryEntry> = self
            .ledger
            .list_inventory(&request.group)
            .await
            .map_err(|e| map_storage_error(e, "load inventory"))?
            .into_iter()
            .map(InventoryEntry::from)
            .filter(|entry| entry.eligible_for(request.backup_type))
            .collect();

        let mut tables: BTreeSet<(String, String)> = BTreeSet::new();
        for entry in &inventory {
            if entry.is_wildcard() {
                for table in self.engine.list_tables(&entry.database).await? {
                    tables.insert((entry.database.clone(), table));
                }
            } else {
                tables.insert((entry.database.clone(), entry.table.clone()));
            }
        }

        let changed_since = match request.backup_type {
            BackupType::Incremental => {
                let days = request.days.unwrap_or(self.config.incremental_lookback_days);
                Some(Utc::now() - ChronoDuration::days(i64::from(days)))
            }
            _ => None,
        };

        let mut objects = Vec::new();
        let mut partitions = Vec::new();
        for (database, table) in tables {
            let infos = self
                .engine
                .list_partitions(&database, &table, changed_since)
                .await?;

            if changed_since.is_some() && infos.is_empty() {
                debug!(database = %database, table = %table, "No changed partitions");
                continue;
            }

            let object = SnapshotObject {
                database: database.clone(),
                table: table.clone(),
                partitions: if changed_since.is_some() {
                    infos.iter().map(|p| p.name.clone()).collect()
                } else {
                    Vec::new()
                },
            };
            partitions.extend(infos.into_iter().map(|info| PartitionDetail {
                label: label.to_string(),
                database: database.clone(),
                table: table.clone(),
                partition: info.name,
                row_count: info.row_count,
                data_size_bytes: info.data_size_bytes,
            }));
            objects.push(object);
        }

        if objects.is_empty() {
            return Err(Error::NothingToBackup {
                group: request.group.clone(),
            });
        }

        Ok(BackupSelection {
            objects,
            partitions,
        })
    }

    // ========== Restore ==========

    /// Restore a target label by applying its chain root first
    #[instrument(skip(self, request), fields(target = %request.target_label))]
    pub async fn restore(&self, request: RestoreRequest) -> Result<RestoreOutcome> {
        let scope = RestoreScope::from_filters(request.group.as_deref(), request.table.as_deref())?;
        validate_rename_suffix(request.rename_suffix.as_deref())?;

        self.prepare().await?;
        let target = self.load_backup(&request.target_label).await?;

        let base_label = self.render_label(request.name.as_deref(), &target.group, "restore")?;
        let lease = self
            .leases
            .acquire(&Scope::restore(&target.group), &base_label)
            .await?;
        let mut machine = StateMachine::new();
        advance(&mut machine, OperationState::LeaseHeld)?;
        let restore_label = lease.label().to_string();

        let record = RestoreRecordModel {
            restore_label: restore_label.clone(),
            target_backup_label: target.label.clone(),
            scope: scope.as_str().to_string(),
            scope_filter: scope.filter(),
            status: BackupStatus::Running.as_str().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            error_message: None,
            verification_checksum: None,
        };
        if let Err(e) = self.ledger.insert_restore(&record).await {
            let err = map_storage_error(e, "insert restore record");
            self.leases.release_or_warn(lease, LeaseOutcome::Failed).await;
            return Err(err);
        }
        advance(&mut machine, OperationState::LabelAssigned)?;

        let result = async {
            let steps = self.plan_restore_steps(&target.label, &scope).await?;
            self.apply_restore_steps(
                &restore_label,
                steps,
                request.rename_suffix.as_deref(),
                &mut machine,
            )
            .await
        }
        .await;

        self.finish_restore(lease, &restore_label, &target.label, "restore", result)
            .await
    }

    /// Restore one partition of one table from a single backup
    #[instrument(skip(self, request), fields(backup = %request.backup_label, table = %request.table))]
    pub async fn restore_partition(&self, request: PartitionRestoreRequest) -> Result<RestoreOutcome> {
        let (database, table) = split_qualified_table(&request.table)?;
        let partition = request.partition.trim().to_string();
        if partition.is_empty() {
            return Err(Error::InvalidInput("partition cannot be empty".to_string()));
        }
        validate_rename_suffix(request.rename_suffix.as_deref())?;

        self.prepare().await?;
        let backup = self.load_backup(&request.backup_label).await?;
        if !backup.is_finished() {
            return Err(Error::BrokenChain {
                label: backup.label.clone(),
                reason: format!("backup is {}", backup.status),
            });
        }

        let recorded = self
            .ledger
            .list_partitions(&backup.label)
            .await
            .map_err(|e| map_storage_error(e, "load backup partitions"))?;
        let present = recorded.iter().any(|p| {
            p.database_name == database && p.table_name == table && p.partition_name == partition
        });
        if !recorded.is_empty() && !present {
            return Err(Error::NotFound(format!(
                "partition '{}' of {}.{} is not recorded in backup '{}'",
                partition, database, table, backup.label
            )));
        }

        let base_label = self.render_label(request.name.as_deref(), &backup.group, "restore")?;
        let lease = self
            .leases
            .acquire(&Scope::restore(&backup.group), &base_label)
            .await?;
        let mut machine = StateMachine::new();
        advance(&mut machine, OperationState::LeaseHeld)?;
        let restore_label = lease.label().to_string();

        let record = RestoreRecordModel {
            restore_label: restore_label.clone(),
            target_backup_label: backup.label.clone(),
            scope: "partition".to_string(),
            scope_filter: Some(format!("{}.{}:{}", database, table, partition)),
            status: BackupStatus::Running.as_str().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            error_message: None,
            verification_checksum: None,
        };
        if let Err(e) = self.ledger.insert_restore(&record).await {
            let err = map_storage_error(e, "insert restore record");
            self.leases.release_or_warn(lease, LeaseOutcome::Failed).await;
            return Err(err);
        }
        advance(&mut machine, OperationState::LabelAssigned)?;

        let step = RestoreStep {
            snapshot_label: backup.label.clone(),
            objects: vec![SnapshotObject {
                database,
                table,
                partitions: vec![partition],
            }],
        };
        let result = self
            .apply_restore_steps(
                &restore_label,
                vec![step],
                request.rename_suffix.as_deref(),
                &mut machine,
            )
            .await;

        self.finish_restore(lease, &restore_label, &backup.label, "restore_partition", result)
            .await
    }

    /// Resolve the chain and pick the objects each step contributes
    async fn plan_restore_steps(&self, target: &str, scope: &RestoreScope) -> Result<Vec<RestoreStep>> {
        let chain = self.resolver.restore_chain(target).await?;

        let inventory: Vec<InventoryEntry> = match scope {
            RestoreScope::Group(group) => self
                .ledger
                .list_inventory(group)
                .await
                .map_err(|e| map_storage_error(e, "load inventory"))?
                .into_iter()
                .map(InventoryEntry::from)
                .collect(),
            _ => Vec::new(),
        };
        if let RestoreScope::Group(group) = scope {
            if inventory.is_empty() {
                return Err(Error::NotFound(format!("inventory group '{}'", group)));
            }
        }

        let mut steps = Vec::new();
        for record in &chain {
            let rows: Vec<PartitionDetail> = self
                .ledger
                .list_partitions(&record.label)
                .await
                .map_err(|e| map_storage_error(e, "load backup partitions"))?
                .into_iter()
                .map(PartitionDetail::from)
                .collect();

            let objects = if rows.is_empty() {
                self.unrecorded_objects(scope, &inventory).await?
            } else {
                select_restore_objects(record, &rows, scope, &inventory)
            };

            match objects {
                Some(objects) => steps.push(RestoreStep {
                    snapshot_label: record.label.clone(),
                    objects,
                }),
                None => {
                    debug!(label = %record.label, "Chain step has nothing in scope, skipping");
                }
            }
        }

        if steps.is_empty() {
            return Err(Error::NotFound(format!(
                "nothing in the chain of '{}' matches the restore scope",
                target
            )));
        }
        Ok(steps)
    }

    /// Objects for a step whose partitions were never recorded.
    ///
    /// An empty list restores the whole snapshot.
    async fn unrecorded_objects(
        &self,
        scope: &RestoreScope,
        inventory: &[InventoryEntry],
    ) -> Result<Option<Vec<SnapshotObject>>> {
        match scope {
            RestoreScope::WholeChain => Ok(Some(Vec::new())),
            RestoreScope::Table { database, table } => {
                Ok(Some(vec![SnapshotObject::whole_table(database, table)]))
            }
            RestoreScope::Group(_) => {
                let mut objects = BTreeSet::new();
                for entry in inventory {
                    if entry.is_wildcard() {
                        for table in self.engine.list_tables(&entry.database).await? {
                            objects.insert((entry.database.clone(), table));
                        }
                    } else {
                        objects.insert((entry.database.clone(), entry.table.clone()));
                    }
                }
                if objects.is_empty() {
                    return Ok(None);
                }
                Ok(Some(
                    objects
                        .into_iter()
                        .map(|(db, table)| SnapshotObject::whole_table(db, table))
                        .collect(),
                ))
            }
        }
    }

    async fn apply_restore_steps(
        &self,
        restore_label: &str,
        steps: Vec<RestoreStep>,
        rename_suffix: Option<&str>,
        machine: &mut StateMachine,
    ) -> Result<(Vec<String>, String)> {
        let total = steps.len();
        let mut hasher = Sha256::new();
        let mut applied = Vec::with_capacity(total);

        for (i, step) in steps.into_iter().enumerate() {
            info!(
                step = i + 1,
                total,
                snapshot = %step.snapshot_label,
                objects = step.objects.len(),
                "Restoring chain step"
            );
            let descriptor = RestoreDescriptor {
                restore_label: restore_label.to_string(),
                snapshot_label: step.snapshot_label.clone(),
                objects: step.objects,
                rename_suffix: rename_suffix.map(str::to_string),
            };

            let handle = self.engine.execute_restore(&descriptor).await?;
            advance(machine, OperationState::Dispatched)?;
            advance(machine, OperationState::Polling)?;
            let report =
                poll_until_terminal(self.engine.as_ref(), &handle, &self.config.poll).await?;
            ensure_finished(&step.snapshot_label, &report)?;

            for line in checksum_lines(&descriptor) {
                hasher.update(line.as_bytes());
                hasher.update(b"\n");
            }
            applied.push(step.snapshot_label);
        }

        Ok((applied, hex::encode(hasher.finalize())))
    }

    async fn finish_restore(
        &self,
        lease: LeaseHandle,
        restore_label: &str,
        target_label: &str,
        metric_kind: &str,
        result: Result<(Vec<String>, String)>,
    ) -> Result<RestoreOutcome> {
        let status = terminal_status(&result);
        let error_message = result.as_ref().err().map(ToString::to_string);
        let checksum = result.as_ref().ok().map(|(_, checksum)| checksum.clone());

        let finalized = self
            .ledger
            .finalize_restore(
                restore_label,
                status.as_str(),
                error_message.as_deref(),
                checksum.as_deref(),
                Utc::now(),
            )
            .await
            .map_err(|e| map_storage_error(e, "finalize restore record"));

        self.leases.release_or_warn(lease, lease_outcome(status)).await;
        OPERATIONS_TOTAL
            .with_label_values(&[metric_kind, outcome_label(status)])
            .inc();

        let (steps, verification_checksum) = result?;
        finalized?;
        info!(restore_label, checksum = %verification_checksum, "Restore finished");
        Ok(RestoreOutcome {
            restore_label: restore_label.to_string(),
            target_label: target_label.to_string(),
            steps,
            verification_checksum,
        })
    }

    // ========== Shared helpers ==========

    /// Schema and engine health checks run before any lease is taken
    async fn prepare(&self) -> Result<()> {
        self.ledger
            .ensure_schema()
            .await
            .map_err(|e| map_storage_error(e, "ensure schema"))?;

        if !self.engine.repository_exists().await? {
            return Err(Error::EngineUnavailable(
                "backup repository does not exist".to_string(),
            ));
        }
        if !self.engine.cluster_healthy().await? {
            return Err(Error::EngineUnavailable(
                "cluster is not healthy".to_string(),
            ));
        }
        Ok(())
    }

    fn render_label(&self, name: Option<&str>, scope: &str, kind: &str) -> Result<String> {
        let template = name.or(self.config.label_template.as_deref());
        let ctx = LabelContext {
            scope,
            date: Utc::now().date_naive(),
            kind,
        };
        Ok(LabelGenerator::default().render(template, &ctx)?)
    }

    async fn load_backup(&self, label: &str) -> Result<BackupRecord> {
        let model = self
            .ledger
            .get_backup(label)
            .await
            .map_err(|e| map_storage_error(e, "load backup"))?
            .ok_or_else(|| Error::UnknownLabel(vec![label.to_string()]))?;
        Ok(BackupRecord::try_from(model)?)
    }
}

fn advance(machine: &mut StateMachine, state: OperationState) -> Result<()> {
    machine.transition(state).map_err(Error::Internal)
}

fn ensure_finished(label: &str, report: &StatusReport) -> Result<()> {
    match report.state {
        EngineState::Finished => Ok(()),
        EngineState::Cancelled => Err(Error::EngineCancelled {
            label: label.to_string(),
        }),
        state => Err(Error::EngineFailed(format!(
            "'{}' ended {}: {}",
            label,
            state.as_str(),
            report
                .error_detail
                .as_deref()
                .unwrap_or("no detail reported")
        ))),
    }
}

/// Ledger status recorded for an operation's result
fn terminal_status<T>(result: &Result<T>) -> BackupStatus {
    match result {
        Ok(_) => BackupStatus::Finished,
        Err(Error::EngineCancelled { .. }) => BackupStatus::Cancelled,
        Err(_) => BackupStatus::Failed,
    }
}

fn lease_outcome(status: BackupStatus) -> LeaseOutcome {
    match status {
        BackupStatus::Finished => LeaseOutcome::Finished,
        BackupStatus::Cancelled => LeaseOutcome::Cancelled,
        _ => LeaseOutcome::Failed,
    }
}

fn outcome_label(status: BackupStatus) -> &'static str {
    match status {
        BackupStatus::Finished => "finished",
        BackupStatus::Cancelled => "cancelled",
        _ => "failed",
    }
}

fn validate_rename_suffix(suffix: Option<&str>) -> Result<()> {
    match suffix {
        Some(s) if s.is_empty() || sanitize(s) != s => Err(Error::InvalidInput(format!(
            "rename suffix '{}' may only contain letters, digits and '_'",
            s
        ))),
        _ => Ok(()),
    }
}

/// Restore objects of one recorded step that fall inside the scope, or
/// `None` when nothing it captured is in scope.
///
/// Standalone steps restore whole tables; incremental steps restore only
/// the partitions they captured.
fn select_restore_objects(
    record: &BackupRecord,
    rows: &[PartitionDetail],
    scope: &RestoreScope,
    inventory: &[InventoryEntry],
) -> Option<Vec<SnapshotObject>> {
    let mut by_table: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for row in rows {
        let in_scope = match scope {
            RestoreScope::WholeChain => true,
            RestoreScope::Group(_) => inventory.iter().any(|e| e.covers(&row.database, &row.table)),
            RestoreScope::Table { database, table } => {
                &row.database == database && &row.table == table
            }
        };
        if in_scope {
            by_table
                .entry((row.database.clone(), row.table.clone()))
                .or_default()
                .push(row.partition.clone());
        }
    }

    if by_table.is_empty() {
        return None;
    }
    let objects: Vec<SnapshotObject> = by_table
        .into_iter()
        .map(|((database, table), partitions)| SnapshotObject {
            database,
            table,
            partitions: if record.backup_type.is_standalone() {
                Vec::new()
            } else {
                partitions
            },
        })
        .collect();
    Some(objects)
}

/// `label:db.table:partition` lines, `*` standing for a whole table or snapshot
fn checksum_lines(descriptor: &RestoreDescriptor) -> Vec<String> {
    if descriptor.objects.is_empty() {
        return vec![format!("{}:*:*", descriptor.snapshot_label)];
    }
    let mut lines = Vec::new();
    for object in &descriptor.objects {
        if object.partitions.is_empty() {
            lines.push(format!("{}:{}:*", descriptor.snapshot_label, object.qualified_name()));
        }
        for partition in &object.partitions {
            lines.push(format!(
                "{}:{}:{}",
                descriptor.snapshot_label,
                object.qualified_name(),
                partition
            ));
        }
    }
    lines
}
