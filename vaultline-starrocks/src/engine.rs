//! StarRocks engine over a MySQL connection pool

use crate::statements;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{Executor, MySqlPool, Row};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use vaultline_core::{
    BackupDescriptor, Engine, EngineError, EngineResult, HandleKind, OperationHandle,
    PartitionInfo, RestoreDescriptor, SnapshotObject, StatusReport,
};

/// Connection settings for the StarRocks frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarRocksConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Database opened by each connection
    pub database: Option<String>,
    /// Snapshot repository, created beforehand with `CREATE REPOSITORY`
    pub repository: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for StarRocksConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9030,
            user: "root".to_string(),
            password: String::new(),
            database: None,
            repository: String::new(),
            max_connections: 4,
            connect_timeout_secs: 10,
        }
    }
}

/// StarRocks implementation of the engine capability
pub struct StarRocksEngine {
    pool: MySqlPool,
    repository: String,
}

impl StarRocksEngine {
    /// Open a lazily connected pool; nothing is contacted until first use
    pub fn connect_lazy(config: &StarRocksConfig) -> EngineResult<Self> {
        if config.repository.trim().is_empty() {
            return Err(EngineError::Unavailable(
                "engine repository must be configured".to_string(),
            ));
        }

        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password);
        if let Some(database) = &config.database {
            options = options.database(database);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_lazy_with(options);

        Ok(Self::from_pool(pool, &config.repository))
    }

    pub fn from_pool(pool: MySqlPool, repository: &str) -> Self {
        Self {
            pool,
            repository: repository.to_string(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Run a statement as plain text; StarRocks rejects most admin
    /// statements over the prepared-statement protocol
    async fn run(&self, sql: &str) -> EngineResult<()> {
        debug!(sql, "Executing engine statement");
        self.pool.execute(sql).await.map_err(map_engine_error)?;
        Ok(())
    }

    async fn fetch(&self, sql: &str) -> EngineResult<Vec<MySqlRow>> {
        debug!(sql, "Querying engine");
        self.pool.fetch_all(sql).await.map_err(map_engine_error)
    }

    /// Newest `Timestamp` of a snapshot in the repository
    async fn snapshot_timestamp(&self, label: &str) -> EngineResult<String> {
        let rows = self
            .fetch(&statements::show_snapshot(&self.repository, label))
            .await?;

        rows.iter()
            .filter_map(|row| text_column(row, "Timestamp"))
            .max()
            .ok_or_else(|| {
                EngineError::Command(format!(
                    "snapshot '{}' not found in repository '{}'",
                    label, self.repository
                ))
            })
    }
}

/// The single database every object lives in
fn single_database(objects: &[SnapshotObject]) -> EngineResult<String> {
    let databases: BTreeSet<&str> = objects.iter().map(|o| o.database.as_str()).collect();
    match databases.len() {
        1 => Ok(databases.into_iter().next().unwrap_or_default().to_string()),
        0 => Err(EngineError::Command(
            "snapshot has no objects to name a database".to_string(),
        )),
        _ => Err(EngineError::Command(format!(
            "a StarRocks snapshot covers one database, got: {}",
            databases.into_iter().collect::<Vec<_>>().join(", ")
        ))),
    }
}

/// Read a column as text regardless of how the server typed it
fn text_column(row: &MySqlRow, name: &str) -> Option<String> {
    if let Ok(value) = row.try_get::<Option<String>, _>(name) {
        return value;
    }
    row.try_get::<Option<Vec<u8>>, _>(name)
        .ok()
        .flatten()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn map_engine_error(e: sqlx::Error) -> EngineError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => EngineError::Unavailable(e.to_string()),
        sqlx::Error::Database(db) => EngineError::Command(db.message().to_string()),
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::Protocol(_) => EngineError::Protocol(e.to_string()),
        other => EngineError::Command(other.to_string()),
    }
}

#[async_trait]
impl Engine for StarRocksEngine {
    #[instrument(skip(self, descriptor), fields(db.system = "starrocks", label = %descriptor.label))]
    async fn execute_backup(&self, descriptor: &BackupDescriptor) -> EngineResult<OperationHandle> {
        let database = single_database(&descriptor.objects)?;
        self.run(&statements::backup_snapshot(&database, descriptor, &self.repository))
            .await?;

        info!(database = %database, objects = descriptor.objects.len(), "Backup submitted");
        Ok(OperationHandle {
            label: descriptor.label.clone(),
            database,
            kind: HandleKind::Backup,
        })
    }

    #[instrument(skip(self, descriptor), fields(db.system = "starrocks", snapshot = %descriptor.snapshot_label))]
    async fn execute_restore(&self, descriptor: &RestoreDescriptor) -> EngineResult<OperationHandle> {
        let database = single_database(&descriptor.objects)?;
        let timestamp = self.snapshot_timestamp(&descriptor.snapshot_label).await?;
        self.run(&statements::restore_snapshot(
            &database,
            descriptor,
            &self.repository,
            &timestamp,
        ))
        .await?;

        info!(database = %database, timestamp = %timestamp, "Restore submitted");
        Ok(OperationHandle {
            label: descriptor.snapshot_label.clone(),
            database,
            kind: HandleKind::Restore,
        })
    }

    async fn poll_status(&self, handle: &OperationHandle) -> EngineResult<StatusReport> {
        let (sql, label_column) = match handle.kind {
            HandleKind::Backup => (statements::show_backup(&handle.database), "SnapshotName"),
            HandleKind::Restore => (statements::show_restore(&handle.database), "Label"),
        };
        let rows = self.fetch(&sql).await?;

        // Most recent job for the label wins
        let row = rows
            .iter()
            .rev()
            .find(|row| text_column(row, label_column).as_deref() == Some(handle.label.as_str()))
            .ok_or_else(|| {
                EngineError::Protocol(format!(
                    "no job for '{}' in database '{}'",
                    handle.label, handle.database
                ))
            })?;

        let state = text_column(row, "State").unwrap_or_default();
        let status = text_column(row, "Status");
        let (state, error_detail) = statements::parse_job_state(&state, status.as_deref());
        Ok(StatusReport {
            state,
            error_detail,
        })
    }

    #[instrument(skip(self), fields(db.system = "starrocks"))]
    async fn drop_snapshot(&self, label: &str) -> EngineResult<()> {
        self.run(&statements::drop_snapshot(&self.repository, label))
            .await
    }

    async fn repository_exists(&self) -> EngineResult<bool> {
        let rows = self.fetch("SHOW REPOSITORIES").await?;
        Ok(rows
            .iter()
            .any(|row| text_column(row, "RepoName").as_deref() == Some(self.repository.as_str())))
    }

    async fn cluster_healthy(&self) -> EngineResult<bool> {
        let rows = self.fetch("SHOW BACKENDS").await?;
        let dead: Vec<String> = rows
            .iter()
            .filter(|row| {
                !text_column(row, "Alive").map_or(false, |alive| alive.eq_ignore_ascii_case("true"))
            })
            .filter_map(|row| text_column(row, "IP").or_else(|| text_column(row, "Host")))
            .collect();

        if rows.is_empty() {
            warn!("Cluster reports no backends");
            return Ok(false);
        }
        if !dead.is_empty() {
            warn!(backends = ?dead, "Backends not alive");
        }
        Ok(dead.is_empty())
    }

    async fn list_tables(&self, database: &str) -> EngineResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT TABLE_NAME FROM information_schema.tables \
             WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
        )
        .bind(database)
        .fetch_all(&self.pool)
        .await
        .map_err(map_engine_error)?;

        Ok(rows
            .iter()
            .filter_map(|row| text_column(row, "TABLE_NAME"))
            .collect())
    }

    async fn list_partitions(
        &self,
        database: &str,
        table: &str,
        changed_since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<PartitionInfo>> {
        let rows = sqlx::query(
            "SELECT PARTITION_NAME, CAST(ROW_COUNT AS BIGINT) AS ROW_COUNT, \
                    CAST(DATA_SIZE AS VARCHAR) AS DATA_SIZE, \
                    CAST(VISIBLE_VERSION_TIME AS DATETIME) AS VISIBLE_VERSION_TIME \
             FROM information_schema.partitions_meta \
             WHERE DB_NAME = ? AND TABLE_NAME = ? AND PARTITION_NAME IS NOT NULL \
               AND (? IS NULL OR VISIBLE_VERSION_TIME >= ?) \
             ORDER BY PARTITION_NAME",
        )
        .bind(database)
        .bind(table)
        .bind(changed_since.map(|ts| ts.naive_utc()))
        .bind(changed_since.map(|ts| ts.naive_utc()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_engine_error)?;

        rows.iter()
            .map(|row| {
                let name = text_column(row, "PARTITION_NAME").ok_or_else(|| {
                    EngineError::Protocol("partition row without PARTITION_NAME".to_string())
                })?;
                let row_count: Option<i64> = row.try_get("ROW_COUNT").map_err(map_engine_error)?;
                let last_modified: Option<NaiveDateTime> =
                    row.try_get("VISIBLE_VERSION_TIME").map_err(map_engine_error)?;
                Ok(PartitionInfo {
                    name,
                    row_count: row_count.unwrap_or(0),
                    data_size_bytes: text_column(row, "DATA_SIZE")
                        .and_then(|raw| statements::parse_size(&raw))
                        .unwrap_or(0),
                    last_modified: last_modified.map(|ts| ts.and_utc()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_database_required() {
        let objects = vec![
            SnapshotObject::whole_table("a", "t1"),
            SnapshotObject::whole_table("a", "t2"),
        ];
        assert_eq!(single_database(&objects).unwrap(), "a");

        let mixed = vec![
            SnapshotObject::whole_table("a", "t1"),
            SnapshotObject::whole_table("b", "t2"),
        ];
        assert!(matches!(single_database(&mixed), Err(EngineError::Command(_))));
        assert!(single_database(&[]).is_err());
    }

    #[test]
    fn test_connect_requires_repository() {
        let config = StarRocksConfig::default();
        assert!(matches!(
            StarRocksEngine::connect_lazy(&config),
            Err(EngineError::Unavailable(_))
        ));
    }

    #[test]
    fn test_pool_errors_mean_unavailable() {
        assert!(matches!(
            map_engine_error(sqlx::Error::PoolTimedOut),
            EngineError::Unavailable(_)
        ));
        assert!(matches!(
            map_engine_error(sqlx::Error::ColumnNotFound("State".to_string())),
            EngineError::Protocol(_)
        ));
    }
}
