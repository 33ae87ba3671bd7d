//! PostgreSQL ledger implementation

use crate::ledger::{holder_description, BackupFilter, Ledger, ReservationRequest};
use crate::{models::*, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;
use vaultline_core::{scopes_conflict, BackupStatus, BackupType, LabelGenerator};

/// Advisory lock key serialising every reservation ("vaultline" in ASCII, truncated)
const RESERVATION_LOCK_KEY: i64 = 0x7661_756c_746c_696e;

/// Configuration for the PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 30,
            idle_timeout_secs: None,
        }
    }
}

/// PostgreSQL ledger backend
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Connect with default pool settings
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_config(database_url, PoolConfig::default()).await
    }

    /// Connect using a PoolConfig
    pub async fn with_pool_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        if config.min_connections == 0 {
            return Err(crate::Error::ValidationError(
                "min_connections must be > 0".to_string(),
            ));
        }
        if config.max_connections == 0 || config.max_connections < config.min_connections {
            return Err(crate::Error::ValidationError(
                "max_connections must be >= min_connections and > 0".to_string(),
            ));
        }

        let mut opts = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs));

        if let Some(idle) = config.idle_timeout_secs {
            opts = opts.idle_timeout(std::time::Duration::from_secs(idle));
        }

        let pool = opts.connect(database_url).await.map_err(map_db_error)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run a closure in a transaction, committing on success and rolling
    /// back on error. Transactions slower than 100ms are logged.
    async fn with_transaction<F, T>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'_, Postgres>) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let result = match f(&mut tx).await {
            Ok(result) => {
                tx.commit().await.map_err(map_db_error)?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback().await.map_err(map_db_error)?;
                Err(e)
            }
        };

        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            warn!(
                operation,
                duration_ms = elapsed.as_millis(),
                "Slow ledger operation detected"
            );
        }

        result
    }

    // ========== Input Validation Helpers ==========

    fn validate_non_empty_string(value: &str, field_name: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(crate::Error::ValidationError(format!(
                "{} cannot be empty",
                field_name
            )));
        }
        Ok(())
    }

    fn validate_backup_status(status: &str) -> Result<()> {
        BackupStatus::try_from(status)
            .map(|_| ())
            .map_err(|e| crate::Error::ValidationError(e.to_string()))
    }

    fn validate_backup(record: &BackupRecordModel) -> Result<()> {
        Self::validate_non_empty_string(&record.label, "Backup label")?;
        Self::validate_non_empty_string(&record.inventory_group, "Inventory group")?;
        BackupType::try_from(record.backup_type.as_str())
            .map_err(|e| crate::Error::ValidationError(e.to_string()))?;
        Self::validate_backup_status(&record.status)
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    #[instrument(skip(self), fields(db.system = "postgresql", db.operation = "MIGRATE"))]
    async fn ensure_schema(&self) -> Result<()> {
        crate::migrations::run_migrations(&self.pool).await
    }

    #[instrument(skip(self), fields(db.system = "postgresql", db.operation = "SELECT"))]
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    #[instrument(
        skip(self, entries),
        fields(
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.sql.table = "table_inventory",
            count = entries.len()
        )
    )]
    async fn upsert_inventory(&self, entries: &[InventoryModel]) -> Result<u64> {
        for entry in entries {
            Self::validate_non_empty_string(&entry.inventory_group, "Inventory group")?;
            Self::validate_non_empty_string(&entry.database_name, "Database name")?;
            Self::validate_non_empty_string(&entry.table_name, "Table name")?;
        }
        let entries = entries.to_vec();

        self.with_transaction("upsert_inventory", |tx| {
            Box::pin(async move {
                let mut written = 0;
                for entry in &entries {
                    let result = sqlx::query(
                        r#"
                        INSERT INTO table_inventory (
                            inventory_group, database_name, table_name,
                            incremental_eligible, weekly_eligible, monthly_eligible, updated_at
                        ) VALUES ($1, $2, $3, $4, $5, $6, NOW())
                        ON CONFLICT (inventory_group, database_name, table_name) DO UPDATE SET
                            incremental_eligible = EXCLUDED.incremental_eligible,
                            weekly_eligible = EXCLUDED.weekly_eligible,
                            monthly_eligible = EXCLUDED.monthly_eligible,
                            updated_at = NOW()
                        "#,
                    )
                    .bind(&entry.inventory_group)
                    .bind(&entry.database_name)
                    .bind(&entry.table_name)
                    .bind(entry.incremental_eligible)
                    .bind(entry.weekly_eligible)
                    .bind(entry.monthly_eligible)
                    .execute(&mut **tx)
                    .await
                    .map_err(map_db_error)?;
                    written += result.rows_affected();
                }
                Ok(written)
            })
        })
        .await
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "SELECT", db.sql.table = "table_inventory")
    )]
    async fn list_inventory(&self, group: &str) -> Result<Vec<InventoryModel>> {
        let rows = sqlx::query_as::<_, InventoryModel>(
            r#"
            SELECT inventory_group, database_name, table_name,
                   incremental_eligible, weekly_eligible, monthly_eligible
            FROM table_inventory
            WHERE inventory_group = $1
            ORDER BY database_name, table_name
            "#,
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(rows)
    }

    #[instrument(
        skip(self, request),
        fields(
            db.system = "postgresql",
            db.operation = "SELECT + INSERT",
            db.sql.table = "run_leases",
            scope = %request.scope,
            base_label = %request.base_label
        )
    )]
    async fn reserve(&self, request: &ReservationRequest) -> Result<RunLeaseModel> {
        Self::validate_non_empty_string(&request.scope, "Lease scope")?;
        Self::validate_non_empty_string(&request.base_label, "Base label")?;
        let request = request.clone();

        self.with_transaction("reserve", |tx| {
            Box::pin(async move {
                // Serialise reservations so the label check and the insert are one step
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(RESERVATION_LOCK_KEY)
                    .execute(&mut **tx)
                    .await
                    .map_err(map_db_error)?;

                let active = sqlx::query_as::<_, RunLeaseModel>(
                    r#"
                    SELECT id, scope, label, state, outcome, acquired_at, released_at
                    FROM run_leases
                    WHERE state = 'ACTIVE'
                    ORDER BY acquired_at
                    "#,
                )
                .fetch_all(&mut **tx)
                .await
                .map_err(map_db_error)?;

                if let Some(holder) = active
                    .iter()
                    .find(|lease| scopes_conflict(&lease.scope, &request.scope))
                {
                    return Err(crate::Error::LeaseConflict {
                        scope: request.scope.clone(),
                        holder: holder_description(holder, &request.scope),
                    });
                }

                let prefix = format!("{}_r", request.base_label);
                let taken: HashSet<String> = sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT label FROM run_leases
                        WHERE label = $1 OR starts_with(label, $2)
                    UNION
                    SELECT label FROM backup_history
                        WHERE label = $1 OR starts_with(label, $2)
                    UNION
                    SELECT restore_label FROM restore_history
                        WHERE restore_label = $1 OR starts_with(restore_label, $2)
                    "#,
                )
                .bind(&request.base_label)
                .bind(&prefix)
                .fetch_all(&mut **tx)
                .await
                .map_err(map_db_error)?
                .into_iter()
                .collect();

                let label = LabelGenerator::new(request.max_revisions)
                    .resolve(&request.base_label, |candidate| taken.contains(candidate))?;

                let lease = sqlx::query_as::<_, RunLeaseModel>(
                    r#"
                    INSERT INTO run_leases (id, scope, label, state, outcome, acquired_at, released_at)
                    VALUES ($1, $2, $3, 'ACTIVE', NULL, $4, NULL)
                    RETURNING id, scope, label, state, outcome, acquired_at, released_at
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&request.scope)
                .bind(&label)
                .bind(Utc::now())
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| match map_db_error(e) {
                    crate::Error::AlreadyExists(_) => crate::Error::LeaseConflict {
                        scope: request.scope.clone(),
                        holder: "unknown".to_string(),
                    },
                    other => other,
                })?;

                debug!(lease_id = %lease.id, label = %lease.label, "Lease reserved");
                Ok(lease)
            })
        })
        .await
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "UPDATE", db.sql.table = "run_leases")
    )]
    async fn release_lease(&self, id: Uuid, outcome: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE run_leases
            SET state = 'RELEASED', outcome = $2, released_at = $3
            WHERE id = $1 AND state = 'ACTIVE'
            "#,
        )
        .bind(id)
        .bind(outcome)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "SELECT", db.sql.table = "run_leases")
    )]
    async fn get_active_lease(&self, scope: &str) -> Result<Option<RunLeaseModel>> {
        let lease = sqlx::query_as::<_, RunLeaseModel>(
            r#"
            SELECT id, scope, label, state, outcome, acquired_at, released_at
            FROM run_leases
            WHERE scope = $1 AND state = 'ACTIVE'
            "#,
        )
        .bind(scope)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(lease)
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "SELECT", db.sql.table = "run_leases")
    )]
    async fn list_active_leases(&self) -> Result<Vec<RunLeaseModel>> {
        let leases = sqlx::query_as::<_, RunLeaseModel>(
            r#"
            SELECT id, scope, label, state, outcome, acquired_at, released_at
            FROM run_leases
            WHERE state = 'ACTIVE'
            ORDER BY acquired_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(leases)
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "UPDATE", db.sql.table = "run_leases")
    )]
    async fn reclaim_lease(
        &self,
        scope: &str,
        acquired_before: DateTime<Utc>,
    ) -> Result<Option<RunLeaseModel>> {
        let lease = sqlx::query_as::<_, RunLeaseModel>(
            r#"
            UPDATE run_leases
            SET state = 'RELEASED', outcome = 'RECLAIMED', released_at = $3
            WHERE scope = $1 AND state = 'ACTIVE' AND acquired_at < $2
            RETURNING id, scope, label, state, outcome, acquired_at, released_at
            "#,
        )
        .bind(scope)
        .bind(acquired_before)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        if let Some(lease) = &lease {
            warn!(scope, label = %lease.label, "Stale lease reclaimed");
        }
        Ok(lease)
    }

    #[instrument(skip(self), fields(db.system = "postgresql", db.operation = "SELECT"))]
    async fn label_exists(&self, label: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM run_leases WHERE label = $1)
                OR EXISTS (SELECT 1 FROM backup_history WHERE label = $1)
                OR EXISTS (SELECT 1 FROM restore_history WHERE restore_label = $1)
            "#,
        )
        .bind(label)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(exists)
    }

    #[instrument(
        skip(self, record),
        fields(
            db.system = "postgresql",
            db.operation = "INSERT",
            db.sql.table = "backup_history",
            label = %record.label
        )
    )]
    async fn insert_backup(&self, record: &BackupRecordModel) -> Result<()> {
        Self::validate_backup(record)?;

        sqlx::query(
            r#"
            INSERT INTO backup_history (
                label, backup_type, inventory_group, status, started_at,
                finished_at, error_message, baseline_label
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&record.label)
        .bind(&record.backup_type)
        .bind(&record.inventory_group)
        .bind(&record.status)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(&record.error_message)
        .bind(&record.baseline_label)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "UPDATE", db.sql.table = "backup_history")
    )]
    async fn mark_backup_running(&self, label: &str, baseline_label: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE backup_history
            SET status = 'RUNNING', baseline_label = $2
            WHERE label = $1 AND status = 'PENDING'
            "#,
        )
        .bind(label)
        .bind(baseline_label)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(crate::Error::InvalidTransition(format!(
                "backup '{}' is not PENDING",
                label
            )));
        }
        Ok(())
    }

    #[instrument(
        skip(self, error_message),
        fields(db.system = "postgresql", db.operation = "UPDATE", db.sql.table = "backup_history")
    )]
    async fn finalize_backup(
        &self,
        label: &str,
        status: &str,
        error_message: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        Self::validate_backup_status(status)?;
        let label = label.to_string();
        let status = status.to_string();
        let error_message = error_message.map(str::to_string);

        self.with_transaction("finalize_backup", |tx| {
            Box::pin(async move {
                let result = sqlx::query(
                    r#"
                    UPDATE backup_history
                    SET status = $2, error_message = $3, finished_at = $4
                    WHERE label = $1 AND status IN ('PENDING', 'RUNNING')
                    "#,
                )
                .bind(&label)
                .bind(&status)
                .bind(&error_message)
                .bind(finished_at)
                .execute(&mut **tx)
                .await
                .map_err(map_db_error)?;

                if result.rows_affected() == 1 {
                    return Ok(());
                }

                let current: Option<String> =
                    sqlx::query_scalar("SELECT status FROM backup_history WHERE label = $1")
                        .bind(&label)
                        .fetch_optional(&mut **tx)
                        .await
                        .map_err(map_db_error)?;

                match current {
                    Some(current) => Err(crate::Error::InvalidTransition(format!(
                        "backup '{}' is already {}",
                        label, current
                    ))),
                    None => Err(crate::Error::NotFound(format!("backup '{}'", label))),
                }
            })
        })
        .await
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "SELECT", db.sql.table = "backup_history")
    )]
    async fn get_backup(&self, label: &str) -> Result<Option<BackupRecordModel>> {
        let record = sqlx::query_as::<_, BackupRecordModel>(
            r#"
            SELECT label, backup_type, inventory_group, status, started_at,
                   finished_at, error_message, baseline_label
            FROM backup_history
            WHERE label = $1
            "#,
        )
        .bind(label)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record)
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "SELECT", db.sql.table = "backup_history")
    )]
    async fn list_backups(&self, filter: &BackupFilter) -> Result<Vec<BackupRecordModel>> {
        if let Some(status) = &filter.status {
            Self::validate_backup_status(status)?;
        }

        // A NULL limit means no limit
        let records = sqlx::query_as::<_, BackupRecordModel>(
            r#"
            SELECT label, backup_type, inventory_group, status, started_at,
                   finished_at, error_message, baseline_label
            FROM backup_history
            WHERE ($1::text IS NULL OR inventory_group = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY started_at DESC, label DESC
            LIMIT $3
            "#,
        )
        .bind(&filter.group)
        .bind(&filter.status)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(records)
    }

    #[instrument(
        skip(self, rows),
        fields(
            db.system = "postgresql",
            db.operation = "INSERT",
            db.sql.table = "backup_partitions",
            count = rows.len()
        )
    )]
    async fn insert_partitions(&self, rows: &[PartitionDetailModel]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let rows = rows.to_vec();

        self.with_transaction("insert_partitions", |tx| {
            Box::pin(async move {
                for row in &rows {
                    sqlx::query(
                        r#"
                        INSERT INTO backup_partitions (
                            label, database_name, table_name, partition_name,
                            row_count, data_size_bytes
                        ) VALUES ($1, $2, $3, $4, $5, $6)
                        ON CONFLICT (label, database_name, table_name, partition_name) DO UPDATE SET
                            row_count = EXCLUDED.row_count,
                            data_size_bytes = EXCLUDED.data_size_bytes
                        "#,
                    )
                    .bind(&row.label)
                    .bind(&row.database_name)
                    .bind(&row.table_name)
                    .bind(&row.partition_name)
                    .bind(row.row_count)
                    .bind(row.data_size_bytes)
                    .execute(&mut **tx)
                    .await
                    .map_err(map_db_error)?;
                }
                Ok(())
            })
        })
        .await
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "SELECT", db.sql.table = "backup_partitions")
    )]
    async fn list_partitions(&self, label: &str) -> Result<Vec<PartitionDetailModel>> {
        let rows = sqlx::query_as::<_, PartitionDetailModel>(
            r#"
            SELECT label, database_name, table_name, partition_name, row_count, data_size_bytes
            FROM backup_partitions
            WHERE label = $1
            ORDER BY database_name, table_name, partition_name
            "#,
        )
        .bind(label)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(rows)
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "DELETE", db.sql.table = "backup_history")
    )]
    async fn delete_backup(&self, label: &str) -> Result<bool> {
        // backup_partitions rows go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM backup_history WHERE label = $1")
            .bind(label)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(
        skip(self, error_message),
        fields(db.system = "postgresql", db.operation = "UPDATE", db.sql.table = "backup_history")
    )]
    async fn mark_partial_prune(&self, label: &str, error_message: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE backup_history
            SET status = 'FAILED_PARTIAL_PRUNE', error_message = $2
            WHERE label = $1
            "#,
        )
        .bind(label)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(crate::Error::NotFound(format!("backup '{}'", label)));
        }
        Ok(())
    }

    #[instrument(
        skip(self, record),
        fields(
            db.system = "postgresql",
            db.operation = "INSERT",
            db.sql.table = "restore_history",
            restore_label = %record.restore_label
        )
    )]
    async fn insert_restore(&self, record: &RestoreRecordModel) -> Result<()> {
        Self::validate_non_empty_string(&record.restore_label, "Restore label")?;
        Self::validate_non_empty_string(&record.target_backup_label, "Target backup label")?;
        Self::validate_backup_status(&record.status)?;

        sqlx::query(
            r#"
            INSERT INTO restore_history (
                restore_label, target_backup_label, scope, scope_filter, status,
                started_at, finished_at, error_message, verification_checksum
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.restore_label)
        .bind(&record.target_backup_label)
        .bind(&record.scope)
        .bind(&record.scope_filter)
        .bind(&record.status)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(&record.error_message)
        .bind(&record.verification_checksum)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    #[instrument(
        skip(self, error_message, verification_checksum),
        fields(db.system = "postgresql", db.operation = "UPDATE", db.sql.table = "restore_history")
    )]
    async fn finalize_restore(
        &self,
        restore_label: &str,
        status: &str,
        error_message: Option<&str>,
        verification_checksum: Option<&str>,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        Self::validate_backup_status(status)?;

        let result = sqlx::query(
            r#"
            UPDATE restore_history
            SET status = $2, error_message = $3, verification_checksum = $4, finished_at = $5
            WHERE restore_label = $1 AND status IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(restore_label)
        .bind(status)
        .bind(error_message)
        .bind(verification_checksum)
        .bind(finished_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(crate::Error::InvalidTransition(format!(
                "restore '{}' is missing or already finalized",
                restore_label
            )));
        }
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "SELECT", db.sql.table = "restore_history")
    )]
    async fn get_restore(&self, restore_label: &str) -> Result<Option<RestoreRecordModel>> {
        let record = sqlx::query_as::<_, RestoreRecordModel>(
            r#"
            SELECT restore_label, target_backup_label, scope, scope_filter, status,
                   started_at, finished_at, error_message, verification_checksum
            FROM restore_history
            WHERE restore_label = $1
            "#,
        )
        .bind(restore_label)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record)
    }

    #[instrument(
        skip(self),
        fields(db.system = "postgresql", db.operation = "SELECT", db.sql.table = "restore_history")
    )]
    async fn list_restores(&self, limit: i64) -> Result<Vec<RestoreRecordModel>> {
        if limit <= 0 {
            return Err(crate::Error::ValidationError(
                "Limit must be greater than 0".to_string(),
            ));
        }

        let records = sqlx::query_as::<_, RestoreRecordModel>(
            r#"
            SELECT restore_label, target_backup_label, scope, scope_filter, status,
                   started_at, finished_at, error_message, verification_checksum
            FROM restore_history
            ORDER BY started_at DESC, restore_label DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(records)
    }
}

/// Map sqlx errors onto storage errors, logging by severity
fn map_db_error(err: sqlx::Error) -> crate::Error {
    match &err {
        sqlx::Error::PoolTimedOut => {
            error!(error = %err, "Connection pool timed out");
            return crate::Error::PoolExhausted("Connection pool timed out".to_string());
        }
        sqlx::Error::PoolClosed => {
            error!(error = %err, "Connection pool closed");
            return crate::Error::ConnectionFailed("Connection pool closed".to_string());
        }
        sqlx::Error::Io(_) => {
            error!(error = %err, "Ledger connection I/O failure");
            return crate::Error::ConnectionFailed(err.to_string());
        }
        _ => {}
    }

    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code().as_deref() {
            match code {
                // unique_violation
                "23505" => {
                    warn!(
                        error_code = code,
                        message = db_err.message(),
                        "Unique constraint violation"
                    );
                    return crate::Error::AlreadyExists(db_err.message().to_string());
                }
                // foreign_key_violation
                "23503" => {
                    warn!(
                        error_code = code,
                        message = db_err.message(),
                        "Foreign key violation"
                    );
                    return crate::Error::NotFound(db_err.message().to_string());
                }
                // not_null_violation
                "23502" => {
                    warn!(
                        error_code = code,
                        message = db_err.message(),
                        "Not null violation"
                    );
                    return crate::Error::ValidationError(format!(
                        "Required field cannot be null: {}",
                        db_err.message()
                    ));
                }
                // check_violation
                "23514" => {
                    warn!(
                        error_code = code,
                        message = db_err.message(),
                        "CHECK constraint violation"
                    );
                    return crate::Error::ValidationError(format!(
                        "Constraint violation: {}",
                        db_err.message()
                    ));
                }
                // too_many_connections
                "53300" => {
                    error!(
                        error_code = code,
                        message = db_err.message(),
                        "Database connection limit reached"
                    );
                    return crate::Error::PoolExhausted(db_err.message().to_string());
                }
                "08006" | "08001" | "08003" | "08004" => {
                    error!(
                        error_code = code,
                        message = db_err.message(),
                        "Database connection failed"
                    );
                    return crate::Error::ConnectionFailed(db_err.message().to_string());
                }
                _ => {
                    error!(
                        error_code = code,
                        message = db_err.message(),
                        "Unexpected database error"
                    );
                }
            }
        }
    }

    error!(error = %err, "Database error");
    crate::Error::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_backup_status_accepts_alias() {
        assert!(PostgresLedger::validate_backup_status("FINISHED").is_ok());
        assert!(PostgresLedger::validate_backup_status("SUCCESS").is_ok());
        assert!(PostgresLedger::validate_backup_status("DONE").is_err());
    }

    #[test]
    fn test_validate_backup_rejects_unknown_type() {
        let record = BackupRecordModel {
            label: "sales_20250101_full".to_string(),
            backup_type: "HOURLY".to_string(),
            inventory_group: "sales".to_string(),
            status: "PENDING".to_string(),
            started_at: Utc::now(),
            finished_at: None,
            error_message: None,
            baseline_label: None,
        };
        assert!(matches!(
            PostgresLedger::validate_backup(&record),
            Err(crate::Error::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_pool_config_validation() {
        let config = PoolConfig {
            min_connections: 0,
            ..Default::default()
        };
        let result = PostgresLedger::with_pool_config("postgresql://localhost/none", config).await;
        assert!(matches!(result, Err(crate::Error::ValidationError(_))));
    }
}
