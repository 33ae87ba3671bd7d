//! Lease scopes and restore filters

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation family used to build lease scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Backup,
    Restore,
    Prune,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Backup => "backup",
            OperationKind::Restore => "restore",
            OperationKind::Prune => "prune",
        }
    }
}

/// Conflict unit for leasing.
///
/// Two operations that would physically conflict must map to the same scope.
/// Backups of any kind on one group share a scope because the engine runs at
/// most one snapshot job per database at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub kind: OperationKind,
    pub target: String,
}

impl Scope {
    pub fn new(kind: OperationKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }

    pub fn backup(group: &str) -> Self {
        Self::new(OperationKind::Backup, group)
    }

    pub fn restore(group: &str) -> Self {
        Self::new(OperationKind::Restore, group)
    }

    /// Prune scope; `None` covers every group
    pub fn prune(group: Option<&str>) -> Self {
        Self::new(OperationKind::Prune, group.unwrap_or("all"))
    }

    /// Whether `self` and `other` may not hold leases at the same time.
    ///
    /// Equal scopes conflict. A prune also conflicts with backups and
    /// restores of its group, since it deletes the snapshots they chain
    /// from; `prune:all` conflicts with every group.
    pub fn conflicts_with(&self, other: &Scope) -> bool {
        if self == other {
            return true;
        }
        match (self.kind, other.kind) {
            (OperationKind::Prune, OperationKind::Prune) => {
                self.covers_all() || other.covers_all()
            }
            (OperationKind::Prune, _) => self.covers_all() || self.target == other.target,
            (_, OperationKind::Prune) => other.covers_all() || self.target == other.target,
            _ => false,
        }
    }

    fn covers_all(&self) -> bool {
        self.kind == OperationKind::Prune && self.target == "all"
    }

    /// Parse the `kind:target` form stored in the ledger
    pub fn parse(raw: &str) -> Result<Self> {
        let (kind, target) = raw
            .split_once(':')
            .ok_or_else(|| Error::InvalidValue(format!("Scope must be kind:target, got '{}'", raw)))?;
        let kind = match kind {
            "backup" => OperationKind::Backup,
            "restore" => OperationKind::Restore,
            "prune" => OperationKind::Prune,
            other => {
                return Err(Error::InvalidValue(format!("Unknown scope kind '{}'", other)));
            }
        };
        if target.is_empty() {
            return Err(Error::InvalidValue("Scope target cannot be empty".to_string()));
        }
        Ok(Self::new(kind, target))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.target)
    }
}

/// Conflict check on the ledger's `kind:target` strings.
///
/// Strings that do not parse as a scope only conflict with themselves.
pub fn scopes_conflict(a: &str, b: &str) -> bool {
    match (Scope::parse(a), Scope::parse(b)) {
        (Ok(a), Ok(b)) => a.conflicts_with(&b),
        _ => a == b,
    }
}

/// Which objects of a backup chain a restore touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreScope {
    /// Every object recorded for each step of the chain
    WholeChain,
    /// Objects belonging to an inventory group
    Group(String),
    /// A single `database.table`
    Table { database: String, table: String },
}

impl RestoreScope {
    /// Build a scope from CLI-style filters, rejecting ambiguous combinations
    pub fn from_filters(group: Option<&str>, table: Option<&str>) -> Result<Self> {
        match (group, table) {
            (Some(_), Some(_)) => Err(Error::AmbiguousScope),
            (Some(group), None) => {
                let group = group.trim();
                if group.is_empty() {
                    return Err(Error::InvalidValue("Group filter cannot be empty".to_string()));
                }
                Ok(RestoreScope::Group(group.to_string()))
            }
            (None, Some(table)) => {
                let (database, table) = split_qualified_table(table)?;
                Ok(RestoreScope::Table { database, table })
            }
            (None, None) => Ok(RestoreScope::WholeChain),
        }
    }

    /// Ledger literal for the restore record's `scope` column
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreScope::WholeChain => "full",
            RestoreScope::Group(_) => "group",
            RestoreScope::Table { .. } => "table",
        }
    }

    /// Filter value stored with the restore record
    pub fn filter(&self) -> Option<String> {
        match self {
            RestoreScope::WholeChain => None,
            RestoreScope::Group(group) => Some(group.clone()),
            RestoreScope::Table { database, table } => Some(format!("{}.{}", database, table)),
        }
    }
}

/// Split `database.table`
pub fn split_qualified_table(raw: &str) -> Result<(String, String)> {
    match raw.trim().split_once('.') {
        Some((db, table)) if !db.is_empty() && !table.is_empty() => {
            Ok((db.to_string(), table.to_string()))
        }
        _ => Err(Error::InvalidValue(format!(
            "Table must be in format database.table, got '{}'",
            raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display_and_parse() {
        let scope = Scope::backup("sales");
        assert_eq!(scope.to_string(), "backup:sales");
        assert_eq!(Scope::parse("backup:sales").unwrap(), scope);
        assert_eq!(Scope::prune(None).to_string(), "prune:all");
        assert!(Scope::parse("nonsense").is_err());
        assert!(Scope::parse("deploy:x").is_err());
    }

    #[test]
    fn test_prune_conflicts_with_work_on_its_group() {
        let prune = Scope::prune(Some("sales"));
        assert!(prune.conflicts_with(&Scope::backup("sales")));
        assert!(Scope::restore("sales").conflicts_with(&prune));
        assert!(!prune.conflicts_with(&Scope::backup("finance")));
        assert!(!prune.conflicts_with(&Scope::prune(Some("finance"))));

        let all = Scope::prune(None);
        assert!(all.conflicts_with(&Scope::backup("finance")));
        assert!(Scope::restore("sales").conflicts_with(&all));
        assert!(all.conflicts_with(&prune));
    }

    #[test]
    fn test_backup_and_restore_do_not_conflict() {
        assert!(!Scope::backup("sales").conflicts_with(&Scope::restore("sales")));
        assert!(!Scope::backup("sales").conflicts_with(&Scope::backup("finance")));
        assert!(Scope::backup("sales").conflicts_with(&Scope::backup("sales")));
    }

    #[test]
    fn test_scopes_conflict_on_ledger_strings() {
        assert!(scopes_conflict("prune:all", "backup:sales"));
        assert!(!scopes_conflict("backup:sales", "restore:sales"));
        assert!(scopes_conflict("legacy", "legacy"));
        assert!(!scopes_conflict("legacy", "backup:sales"));
    }

    #[test]
    fn test_group_and_table_is_ambiguous() {
        let result = RestoreScope::from_filters(Some("sales"), Some("sales_db.orders"));
        assert_eq!(result, Err(Error::AmbiguousScope));
    }

    #[test]
    fn test_table_filter_requires_qualified_name() {
        assert!(RestoreScope::from_filters(None, Some("orders")).is_err());
        assert_eq!(
            RestoreScope::from_filters(None, Some("sales_db.orders")).unwrap(),
            RestoreScope::Table {
                database: "sales_db".to_string(),
                table: "orders".to_string()
            }
        );
    }

    #[test]
    fn test_no_filter_is_whole_chain() {
        let scope = RestoreScope::from_filters(None, None).unwrap();
        assert_eq!(scope, RestoreScope::WholeChain);
        assert_eq!(scope.as_str(), "full");
        assert_eq!(scope.filter(), None);
    }
}
