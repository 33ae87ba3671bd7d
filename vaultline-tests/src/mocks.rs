//! Mock implementations for external services
//!
//! [`ScriptedEngine`] stands in for the database. Polls answer FINISHED
//! immediately unless a script was queued for the label, and every call is
//! recorded for later inspection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use vaultline_core::{
    BackupDescriptor, Engine, EngineError, EngineResult, HandleKind, OperationHandle,
    PartitionInfo, RestoreDescriptor, StatusReport,
};

#[derive(Default)]
struct Inner {
    repository_missing: bool,
    cluster_down: bool,
    always_running: bool,
    tables: BTreeMap<String, Vec<String>>,
    partitions: HashMap<(String, String), Vec<PartitionInfo>>,
    scripts: HashMap<String, VecDeque<StatusReport>>,
    failing_drops: HashSet<String>,
    backups: Vec<BackupDescriptor>,
    restores: Vec<RestoreDescriptor>,
    drops: Vec<String>,
    polls: usize,
}

/// Scripted engine for runner, restore and prune tests
///
/// # Example
///
/// ```ignore
/// use vaultline_tests::mocks::ScriptedEngine;
///
/// let engine = ScriptedEngine::new()
///     .with_table("sales_db", "orders", &["p1", "p2"])
///     .with_script("sales_20250101_full", vec![StatusReport::running(), StatusReport::finished()]);
/// ```
#[derive(Default)]
pub struct ScriptedEngine {
    inner: Mutex<Inner>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table whose partitions were all modified just now
    pub fn with_table(self, database: &str, table: &str, partitions: &[&str]) -> Self {
        let infos = partitions
            .iter()
            .map(|name| partition_info(name, Some(Utc::now())))
            .collect();
        self.with_partitions(database, table, infos)
    }

    /// Register a table with explicit partition metadata
    pub fn with_partitions(self, database: &str, table: &str, partitions: Vec<PartitionInfo>) -> Self {
        {
            let mut inner = self.inner.lock();
            let tables = inner.tables.entry(database.to_string()).or_default();
            if !tables.iter().any(|t| t == table) {
                tables.push(table.to_string());
            }
            inner
                .partitions
                .insert((database.to_string(), table.to_string()), partitions);
        }
        self
    }

    /// Queue poll answers for a label; FINISHED once the queue drains
    pub fn with_script(self, label: &str, answers: Vec<StatusReport>) -> Self {
        self.inner
            .lock()
            .scripts
            .insert(label.to_string(), answers.into());
        self
    }

    /// Every poll answers RUNNING
    pub fn always_running(self) -> Self {
        self.inner.lock().always_running = true;
        self
    }

    pub fn without_repository(self) -> Self {
        self.inner.lock().repository_missing = true;
        self
    }

    pub fn with_unhealthy_cluster(self) -> Self {
        self.inner.lock().cluster_down = true;
        self
    }

    /// Make `drop_snapshot` fail for one label
    pub fn fail_drop_for(&self, label: &str) {
        self.inner.lock().failing_drops.insert(label.to_string());
    }

    /// Stop answering RUNNING for every poll
    pub fn finish_all(&self) {
        let mut inner = self.inner.lock();
        inner.always_running = false;
        inner.scripts.clear();
    }

    pub fn backups(&self) -> Vec<BackupDescriptor> {
        self.inner.lock().backups.clone()
    }

    pub fn restores(&self) -> Vec<RestoreDescriptor> {
        self.inner.lock().restores.clone()
    }

    pub fn drops(&self) -> Vec<String> {
        self.inner.lock().drops.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.inner.lock().polls
    }
}

/// Partition metadata with fixed sizes
pub fn partition_info(name: &str, last_modified: Option<DateTime<Utc>>) -> PartitionInfo {
    PartitionInfo {
        name: name.to_string(),
        row_count: 1000,
        data_size_bytes: 64 * 1024,
        last_modified,
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn execute_backup(&self, descriptor: &BackupDescriptor) -> EngineResult<OperationHandle> {
        let mut inner = self.inner.lock();
        inner.backups.push(descriptor.clone());
        Ok(OperationHandle {
            label: descriptor.label.clone(),
            database: descriptor
                .objects
                .first()
                .map(|o| o.database.clone())
                .unwrap_or_default(),
            kind: HandleKind::Backup,
        })
    }

    async fn execute_restore(&self, descriptor: &RestoreDescriptor) -> EngineResult<OperationHandle> {
        let mut inner = self.inner.lock();
        inner.restores.push(descriptor.clone());
        Ok(OperationHandle {
            label: descriptor.snapshot_label.clone(),
            database: descriptor
                .objects
                .first()
                .map(|o| o.database.clone())
                .unwrap_or_default(),
            kind: HandleKind::Restore,
        })
    }

    async fn poll_status(&self, handle: &OperationHandle) -> EngineResult<StatusReport> {
        let mut inner = self.inner.lock();
        inner.polls += 1;
        if inner.always_running {
            return Ok(StatusReport::running());
        }
        let next = inner
            .scripts
            .get_mut(&handle.label)
            .and_then(|queue| queue.pop_front());
        Ok(next.unwrap_or_else(StatusReport::finished))
    }

    async fn drop_snapshot(&self, label: &str) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        if inner.failing_drops.contains(label) {
            return Err(EngineError::Command(format!("cannot drop snapshot {}", label)));
        }
        inner.drops.push(label.to_string());
        Ok(())
    }

    async fn repository_exists(&self) -> EngineResult<bool> {
        Ok(!self.inner.lock().repository_missing)
    }

    async fn cluster_healthy(&self) -> EngineResult<bool> {
        Ok(!self.inner.lock().cluster_down)
    }

    async fn list_tables(&self, database: &str) -> EngineResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .tables
            .get(database)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_partitions(
        &self,
        database: &str,
        table: &str,
        changed_since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<PartitionInfo>> {
        let inner = self.inner.lock();
        let all = inner
            .partitions
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(match changed_since {
            // Unknown modification time counts as changed
            Some(since) => all
                .into_iter()
                .filter(|p| p.last_modified.map_or(true, |ts| ts >= since))
                .collect(),
            None => all,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_script_then_finished() {
        let engine = ScriptedEngine::new().with_script("l1", vec![StatusReport::running()]);
        let handle = OperationHandle {
            label: "l1".to_string(),
            database: "db".to_string(),
            kind: HandleKind::Backup,
        };
        assert_eq!(engine.poll_status(&handle).await.unwrap(), StatusReport::running());
        assert_eq!(engine.poll_status(&handle).await.unwrap(), StatusReport::finished());
        assert_eq!(engine.poll_count(), 2);
    }

    #[tokio::test]
    async fn test_changed_since_filters_partitions() {
        let old = Utc::now() - Duration::days(10);
        let engine = ScriptedEngine::new().with_partitions(
            "db",
            "t",
            vec![partition_info("p_old", Some(old)), partition_info("p_new", Some(Utc::now()))],
        );
        let since = Utc::now() - Duration::days(1);
        let changed = engine.list_partitions("db", "t", Some(since)).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].name, "p_new");
        assert_eq!(engine.list_partitions("db", "t", None).await.unwrap().len(), 2);
    }
}
