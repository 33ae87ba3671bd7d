//! StarRocks statement builders and response parsing
//!
//! Everything here is pure so the SQL text can be checked without a cluster.

use vaultline_core::{BackupDescriptor, EngineState, RestoreDescriptor, SnapshotObject};

/// Backquote an identifier
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Single-quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn quote_property(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn object_clause(object: &SnapshotObject, alias_suffix: Option<&str>) -> String {
    let mut clause = format!("TABLE {}", quote_ident(&object.table));
    if !object.partitions.is_empty() {
        let partitions: Vec<String> = object.partitions.iter().map(|p| quote_ident(p)).collect();
        clause.push_str(&format!(" PARTITION ({})", partitions.join(", ")));
    }
    if let Some(suffix) = alias_suffix {
        clause.push_str(&format!(" AS {}", quote_ident(&format!("{}{}", object.table, suffix))));
    }
    clause
}

fn on_clause(objects: &[SnapshotObject], alias_suffix: Option<&str>) -> String {
    if objects.is_empty() {
        return String::new();
    }
    let clauses: Vec<String> = objects
        .iter()
        .map(|o| object_clause(o, alias_suffix))
        .collect();
    format!(" ON ({})", clauses.join(", "))
}

/// `BACKUP SNAPSHOT db.label TO repo ON (TABLE t PARTITION (..), ..)`
pub fn backup_snapshot(database: &str, descriptor: &BackupDescriptor, repository: &str) -> String {
    format!(
        "BACKUP SNAPSHOT {}.{} TO {}{}",
        quote_ident(database),
        quote_ident(&descriptor.label),
        quote_ident(repository),
        on_clause(&descriptor.objects, None)
    )
}

/// `RESTORE SNAPSHOT db.label FROM repo ON (...) PROPERTIES (...)`
pub fn restore_snapshot(
    database: &str,
    descriptor: &RestoreDescriptor,
    repository: &str,
    backup_timestamp: &str,
) -> String {
    format!(
        "RESTORE SNAPSHOT {}.{} FROM {}{} PROPERTIES (\"backup_timestamp\" = {})",
        quote_ident(database),
        quote_ident(&descriptor.snapshot_label),
        quote_ident(repository),
        on_clause(&descriptor.objects, descriptor.rename_suffix.as_deref()),
        quote_property(backup_timestamp)
    )
}

pub fn show_snapshot(repository: &str, label: &str) -> String {
    format!(
        "SHOW SNAPSHOT ON {} WHERE SNAPSHOT = {}",
        quote_ident(repository),
        quote_literal(label)
    )
}

pub fn drop_snapshot(repository: &str, label: &str) -> String {
    format!(
        "DROP SNAPSHOT ON {} WHERE SNAPSHOT = {}",
        quote_ident(repository),
        quote_literal(label)
    )
}

pub fn show_backup(database: &str) -> String {
    format!("SHOW BACKUP FROM {}", quote_ident(database))
}

pub fn show_restore(database: &str) -> String {
    format!("SHOW RESTORE FROM {}", quote_ident(database))
}

/// Map a job's `State` and `Status` columns to an engine state.
///
/// StarRocks reports failed jobs as CANCELLED with an error in `Status`;
/// only a CANCELLED job whose status is `[OK]` was cancelled cleanly.
pub fn parse_job_state(state: &str, status: Option<&str>) -> (EngineState, Option<String>) {
    let detail = status
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("[OK]"))
        .map(str::to_string);

    match state.trim().to_ascii_uppercase().as_str() {
        "FINISHED" | "SUCCESS" => (EngineState::Finished, None),
        "FAILED" => (EngineState::Failed, detail),
        "CANCELLED" => match detail {
            Some(detail) => (EngineState::Failed, Some(detail)),
            None => (EngineState::Cancelled, None),
        },
        _ => (EngineState::Running, None),
    }
}

/// Parse a `DATA_SIZE` value such as `1.5GB`, `512 KB` or `42B` into bytes
pub fn parse_size(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number.trim().parse().ok()?;

    let multiplier: f64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "KB" | "K" => 1024.0,
        "MB" | "M" => 1024.0 * 1024.0,
        "GB" | "G" => 1024.0 * 1024.0 * 1024.0,
        "TB" | "T" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultline_core::BackupType;

    #[test]
    fn test_incremental_backup_lists_partitions() {
        let descriptor = BackupDescriptor {
            label: "sales_20250101_inc".to_string(),
            backup_type: BackupType::Incremental,
            objects: vec![
                SnapshotObject {
                    database: "sales_db".to_string(),
                    table: "orders".to_string(),
                    partitions: vec!["p20250101".to_string(), "p20250102".to_string()],
                },
                SnapshotObject::whole_table("sales_db", "items"),
            ],
            baseline_label: Some("sales_20241231_full".to_string()),
        };
        assert_eq!(
            backup_snapshot("sales_db", &descriptor, "s3_repo"),
            "BACKUP SNAPSHOT `sales_db`.`sales_20250101_inc` TO `s3_repo` \
             ON (TABLE `orders` PARTITION (`p20250101`, `p20250102`), TABLE `items`)"
        );
    }

    #[test]
    fn test_restore_with_rename_suffix() {
        let descriptor = RestoreDescriptor {
            restore_label: "r1".to_string(),
            snapshot_label: "sales_20250101_full".to_string(),
            objects: vec![SnapshotObject::whole_table("sales_db", "orders")],
            rename_suffix: Some("_restored".to_string()),
        };
        assert_eq!(
            restore_snapshot("sales_db", &descriptor, "s3_repo", "2025-01-01-02-00-00-123"),
            "RESTORE SNAPSHOT `sales_db`.`sales_20250101_full` FROM `s3_repo` \
             ON (TABLE `orders` AS `orders_restored`) \
             PROPERTIES (\"backup_timestamp\" = \"2025-01-01-02-00-00-123\")"
        );
    }

    #[test]
    fn test_literals_are_escaped() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_ident("odd`name"), "`odd``name`");
        assert_eq!(
            drop_snapshot("repo", "a'b"),
            "DROP SNAPSHOT ON `repo` WHERE SNAPSHOT = 'a''b'"
        );
    }

    #[test]
    fn test_job_states() {
        assert_eq!(parse_job_state("UPLOADING", Some("[OK]")).0, EngineState::Running);
        assert_eq!(parse_job_state("FINISHED", Some("[OK]")), (EngineState::Finished, None));
        assert_eq!(parse_job_state("success", None).0, EngineState::Finished);
        assert_eq!(parse_job_state("CANCELLED", Some("[OK]")), (EngineState::Cancelled, None));
        assert_eq!(
            parse_job_state("CANCELLED", Some("[IO_ERROR] broker unreachable")),
            (EngineState::Failed, Some("[IO_ERROR] broker unreachable".to_string()))
        );
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("42B"), Some(42));
        assert_eq!(parse_size("1.5 KB"), Some(1536));
        assert_eq!(parse_size("2GB"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("0"), Some(0));
        assert_eq!(parse_size("lots"), None);
    }
}
