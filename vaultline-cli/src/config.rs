//! CLI configuration management
//!
//! One TOML file describes the ledger, the engine connection, operation
//! tunables and the table inventory. `DATABASE_URL` overrides the ledger
//! URL and the engine password may come from an environment variable.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use vaultline_core::{BackupType, BaselinePolicy, InventoryEntry};
use vaultline_runtime::{PollPolicy, RunnerConfig};
use vaultline_starrocks::StarRocksConfig;
use vaultline_storage::PoolConfig;

/// Default environment variable holding the engine password
pub const DEFAULT_PASSWORD_ENV: &str = "VAULTLINE_ENGINE_PASSWORD";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub operation: OperationConfig,
    #[serde(default)]
    pub inventory: Vec<InventoryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub host: String,
    #[serde(default = "default_engine_port")]
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub password_env: Option<String>,
    pub database: Option<String>,
    pub repository: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_secs: u64,
    #[serde(default = "default_poll_backoff")]
    pub poll_backoff: f64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_stale_lease_after")]
    pub stale_lease_after_secs: u64,
    pub label_template: Option<String>,
    #[serde(default = "default_baseline_types")]
    pub baseline_types: Vec<String>,
    #[serde(default = "default_lookback_days")]
    pub incremental_lookback_days: u32,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_poll_interval_secs: default_max_poll_interval(),
            poll_backoff: default_poll_backoff(),
            timeout_secs: default_timeout(),
            stale_lease_after_secs: default_stale_lease_after(),
            label_template: None,
            baseline_types: default_baseline_types(),
            incremental_lookback_days: default_lookback_days(),
        }
    }
}

/// One `[[inventory]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryConfig {
    pub group: String,
    pub database: String,
    /// `*` for every table in the database
    pub table: String,
    #[serde(default = "default_true")]
    pub incremental: bool,
    #[serde(default = "default_true")]
    pub weekly: bool,
    #[serde(default = "default_true")]
    pub monthly: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_engine_port() -> u16 {
    9030
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_poll_interval() -> u64 {
    30
}

fn default_poll_backoff() -> f64 {
    1.5
}

fn default_timeout() -> u64 {
    6 * 60 * 60
}

fn default_stale_lease_after() -> u64 {
    24 * 60 * 60
}

fn default_baseline_types() -> Vec<String> {
    vec!["full".to_string(), "weekly".to_string(), "monthly".to_string()]
}

fn default_lookback_days() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.host.trim().is_empty() {
            bail!("engine.host is required");
        }
        if self.engine.port == 0 {
            bail!("engine.port must be > 0");
        }
        if self.engine.user.trim().is_empty() {
            bail!("engine.user is required");
        }
        if self.engine.repository.trim().is_empty() {
            bail!("engine.repository is required");
        }
        if self.ledger.max_connections == 0 {
            bail!("ledger.max_connections must be > 0");
        }

        let op = &self.operation;
        if op.poll_interval_secs == 0 {
            bail!("operation.poll_interval_secs must be > 0");
        }
        if op.max_poll_interval_secs < op.poll_interval_secs {
            bail!("operation.max_poll_interval_secs must be >= poll_interval_secs");
        }
        if op.poll_backoff < 1.0 {
            bail!("operation.poll_backoff must be >= 1.0");
        }
        if op.timeout_secs < op.poll_interval_secs {
            bail!("operation.timeout_secs must be >= poll_interval_secs");
        }
        if op.incremental_lookback_days == 0 {
            bail!("operation.incremental_lookback_days must be > 0");
        }
        self.baseline_policy()?;

        for (i, entry) in self.inventory.iter().enumerate() {
            if entry.group.trim().is_empty()
                || entry.database.trim().is_empty()
                || entry.table.trim().is_empty()
            {
                bail!("inventory[{}]: group, database and table must be non-empty", i);
            }
        }
        Ok(())
    }

    /// Ledger URL, `DATABASE_URL` taking precedence over the file
    pub fn database_url(&self) -> Result<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.ledger.database_url.clone())
            .context("No ledger URL: set ledger.database_url or DATABASE_URL")
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.ledger.max_connections,
            min_connections: 1,
            acquire_timeout_secs: self.ledger.acquire_timeout_secs,
            idle_timeout_secs: None,
        }
    }

    /// Engine password from the file, else from the password variable
    pub fn engine_password(&self) -> String {
        if let Some(password) = &self.engine.password {
            return password.clone();
        }
        let var = self
            .engine
            .password_env
            .as_deref()
            .unwrap_or(DEFAULT_PASSWORD_ENV);
        std::env::var(var).unwrap_or_default()
    }

    pub fn starrocks(&self) -> StarRocksConfig {
        StarRocksConfig {
            host: self.engine.host.clone(),
            port: self.engine.port,
            user: self.engine.user.clone(),
            password: self.engine_password(),
            database: self.engine.database.clone(),
            repository: self.engine.repository.clone(),
            ..StarRocksConfig::default()
        }
    }

    pub fn baseline_policy(&self) -> Result<BaselinePolicy> {
        let types = self
            .operation
            .baseline_types
            .iter()
            .map(|raw| {
                BackupType::try_from(raw.as_str())
                    .with_context(|| format!("operation.baseline_types: '{}'", raw))
            })
            .collect::<Result<Vec<_>>>()?;
        BaselinePolicy::new(types).context("operation.baseline_types")
    }

    pub fn runner_config(&self) -> RunnerConfig {
        let op = &self.operation;
        RunnerConfig {
            poll: PollPolicy {
                interval: Duration::from_secs(op.poll_interval_secs),
                max_interval: Duration::from_secs(op.max_poll_interval_secs),
                backoff_multiplier: op.poll_backoff,
                timeout: Duration::from_secs(op.timeout_secs),
            },
            label_template: op.label_template.clone(),
            incremental_lookback_days: op.incremental_lookback_days,
        }
    }

    pub fn stale_lease_after(&self) -> Duration {
        Duration::from_secs(self.operation.stale_lease_after_secs)
    }

    pub fn inventory_entries(&self) -> Vec<InventoryEntry> {
        self.inventory
            .iter()
            .map(|entry| InventoryEntry {
                group: entry.group.trim().to_string(),
                database: entry.database.trim().to_string(),
                table: entry.table.trim().to_string(),
                incremental_eligible: entry.incremental,
                weekly_eligible: entry.weekly,
                monthly_eligible: entry.monthly,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[ledger]
database_url = "postgresql://vaultline@localhost/vaultline"

[engine]
host = "fe.internal"
user = "backup"
password = "secret"
repository = "s3_repo"

[[inventory]]
group = "sales"
database = "sales_db"
table = "orders"

[[inventory]]
group = "sales"
database = "sales_db"
table = "*"
incremental = false
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.engine.port, 9030);
        assert_eq!(config.operation.timeout_secs, 21600);
        assert_eq!(config.operation.poll_interval_secs, 5);
        assert_eq!(config.baseline_policy().unwrap(), BaselinePolicy::default());

        let entries = config.inventory_entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].incremental_eligible);
        assert!(!entries[1].incremental_eligible);
        assert!(entries[1].is_wildcard());
    }

    #[test]
    fn test_runner_config_from_operation_section() {
        let raw = format!(
            "{}\n[operation]\npoll_interval_secs = 2\nmax_poll_interval_secs = 10\ntimeout_secs = 60\nlabel_template = \"{{group}}_{{type}}\"\n",
            MINIMAL
        );
        let config = Config::from_toml(&raw).unwrap();
        let runner = config.runner_config();
        assert_eq!(runner.poll.interval, Duration::from_secs(2));
        assert_eq!(runner.poll.timeout, Duration::from_secs(60));
        assert_eq!(runner.label_template.as_deref(), Some("{group}_{type}"));
    }

    #[test]
    fn test_missing_repository_is_rejected() {
        let raw = MINIMAL.replace("repository = \"s3_repo\"", "repository = \"\"");
        assert!(Config::from_toml(&raw).is_err());
    }

    #[test]
    fn test_incremental_baseline_type_is_rejected() {
        let raw = format!("{}\n[operation]\nbaseline_types = [\"incremental\"]\n", MINIMAL);
        assert!(Config::from_toml(&raw).is_err());
    }

    #[test]
    fn test_timeout_shorter_than_interval_is_rejected() {
        let raw = format!("{}\n[operation]\npoll_interval_secs = 10\ntimeout_secs = 5\nmax_poll_interval_secs = 10\n", MINIMAL);
        assert!(Config::from_toml(&raw).is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let raw = format!("{}\n[operation]\npoll_every = 3\n", MINIMAL);
        assert!(Config::from_toml(&raw).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.engine.repository, "s3_repo");
        assert_eq!(config.engine_password(), "secret");
    }
}
