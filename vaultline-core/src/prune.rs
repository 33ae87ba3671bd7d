//! Pruning strategies and delete-set planning
//!
//! Planning never touches the engine or the ledger. It selects candidates
//! under exactly one strategy, then pulls back any candidate that a retained
//! incremental backup still needs for its restore chain.

use crate::chain::{recency_key, History};
use crate::types::{BackupRecord, BackupStatus, BackupType};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Timestamp format accepted by `--older-than`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One pruning strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneStrategy {
    KeepLast(usize),
    OlderThan(DateTime<Utc>),
    Snapshot(String),
    Snapshots(Vec<String>),
}

impl PruneStrategy {
    /// Build a strategy from mutually exclusive options.
    ///
    /// Exactly one option must be set.
    pub fn from_options(
        keep_last: Option<usize>,
        older_than: Option<&str>,
        snapshot: Option<&str>,
        snapshots: Option<&[String]>,
    ) -> Result<Self> {
        let supplied = [
            keep_last.is_some(),
            older_than.is_some(),
            snapshot.is_some(),
            snapshots.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if supplied != 1 {
            return Err(Error::InvalidStrategy(format!(
                "exactly one of keep-last, older-than, snapshot, snapshots is required ({} given)",
                supplied
            )));
        }

        if let Some(count) = keep_last {
            if count == 0 {
                return Err(Error::InvalidStrategy(
                    "keep-last requires a positive count".to_string(),
                ));
            }
            return Ok(PruneStrategy::KeepLast(count));
        }

        if let Some(raw) = older_than {
            return Ok(PruneStrategy::OlderThan(parse_timestamp(raw)?));
        }

        if let Some(label) = snapshot {
            let label = label.trim();
            if label.is_empty() {
                return Err(Error::InvalidStrategy("snapshot label cannot be empty".to_string()));
            }
            return Ok(PruneStrategy::Snapshot(label.to_string()));
        }

        let labels: Vec<String> = snapshots
            .unwrap_or_default()
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if labels.is_empty() {
            return Err(Error::InvalidStrategy(
                "snapshots requires at least one label".to_string(),
            ));
        }
        Ok(PruneStrategy::Snapshots(labels))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PruneStrategy::KeepLast(_) => "keep_last",
            PruneStrategy::OlderThan(_) => "older_than",
            PruneStrategy::Snapshot(_) => "snapshot",
            PruneStrategy::Snapshots(_) => "snapshots",
        }
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| {
            Error::InvalidStrategy(format!(
                "invalid timestamp '{}', expected 'YYYY-MM-DD HH:MM:SS'",
                raw
            ))
        })
}

/// Candidate kept because a retained incremental depends on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetainedBackup {
    pub label: String,
    /// Retained incremental backups whose chain includes `label`
    pub dependents: Vec<String>,
}

/// Outcome of planning a prune
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    /// Final delete-set, oldest first
    pub delete: Vec<BackupRecord>,
    pub retained_due_to_dependency: Vec<RetainedBackup>,
    /// Requested labels that are not finished backups in scope
    pub unknown_labels: Vec<String>,
}

impl PrunePlan {
    pub fn delete_labels(&self) -> Vec<&str> {
        self.delete.iter().map(|r| r.label.as_str()).collect()
    }
}

/// Plan a prune over the full history.
///
/// Candidates are FINISHED backups, optionally restricted to one group.
/// Dependency protection considers every retained incremental in history,
/// including in-flight ones, regardless of group.
pub fn plan(history: &History, group: Option<&str>, strategy: &PruneStrategy) -> PrunePlan {
    let mut candidates: Vec<&BackupRecord> = history
        .records()
        .iter()
        .filter(|r| r.is_finished())
        .filter(|r| group.map_or(true, |g| r.group == g))
        .collect();
    // Newest first
    candidates.sort_by(|a, b| recency_key(b).cmp(&recency_key(a)));

    let mut unknown_labels = Vec::new();
    let selected: Vec<&BackupRecord> = match strategy {
        PruneStrategy::KeepLast(n) => candidates.iter().skip(*n).copied().collect(),
        PruneStrategy::OlderThan(cutoff) => candidates
            .iter()
            .filter(|r| r.finished_at.map_or(false, |ts| ts < *cutoff))
            .copied()
            .collect(),
        PruneStrategy::Snapshot(label) => {
            select_labels(&candidates, std::slice::from_ref(label), &mut unknown_labels)
        }
        PruneStrategy::Snapshots(labels) => {
            select_labels(&candidates, labels, &mut unknown_labels)
        }
    };

    let selected_labels: HashSet<&str> = selected.iter().map(|r| r.label.as_str()).collect();

    // label -> retained dependents
    let mut protected: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for record in history.records() {
        if selected_labels.contains(record.label.as_str()) || !is_live_incremental(record) {
            continue;
        }
        for ancestor in history.ancestors(&record.label) {
            if selected_labels.contains(ancestor) {
                protected.entry(ancestor).or_default().insert(record.label.as_str());
            }
        }
    }

    let mut delete: Vec<BackupRecord> = selected
        .iter()
        .filter(|r| !protected.contains_key(r.label.as_str()))
        .map(|r| (*r).clone())
        .collect();
    // Oldest first so the execution order drops history from the back
    delete.sort_by(|a, b| recency_key(a).cmp(&recency_key(b)));

    let retained_due_to_dependency = protected
        .into_iter()
        .map(|(label, dependents)| RetainedBackup {
            label: label.to_string(),
            dependents: dependents.into_iter().map(str::to_string).collect(),
        })
        .collect();

    PrunePlan {
        delete,
        retained_due_to_dependency,
        unknown_labels,
    }
}

fn select_labels<'a>(
    candidates: &[&'a BackupRecord],
    labels: &[String],
    unknown: &mut Vec<String>,
) -> Vec<&'a BackupRecord> {
    let mut selected = Vec::new();
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label.as_str()) {
            continue;
        }
        match candidates.iter().find(|r| &r.label == label) {
            Some(record) => selected.push(*record),
            None => unknown.push(label.clone()),
        }
    }
    selected
}

fn is_live_incremental(record: &BackupRecord) -> bool {
    record.backup_type == BackupType::Incremental
        && matches!(
            record.status,
            BackupStatus::Finished | BackupStatus::Pending | BackupStatus::Running
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn finished(label: &str, backup_type: BackupType, n: i64, baseline: Option<&str>) -> BackupRecord {
        BackupRecord {
            label: label.to_string(),
            backup_type,
            group: "g".to_string(),
            status: BackupStatus::Finished,
            started_at: day(n),
            finished_at: Some(day(n)),
            error_message: None,
            baseline_label: baseline.map(str::to_string),
        }
    }

    fn fulls() -> History {
        History::new(vec![
            finished("day1", BackupType::Full, 1, None),
            finished("day2", BackupType::Full, 2, None),
            finished("day3", BackupType::Full, 3, None),
        ])
    }

    #[test]
    fn test_strategy_requires_exactly_one_option() {
        assert!(matches!(
            PruneStrategy::from_options(None, None, None, None),
            Err(Error::InvalidStrategy(_))
        ));
        assert!(matches!(
            PruneStrategy::from_options(Some(2), None, Some("x"), None),
            Err(Error::InvalidStrategy(_))
        ));
        assert!(matches!(
            PruneStrategy::from_options(Some(0), None, None, None),
            Err(Error::InvalidStrategy(_))
        ));
        assert_eq!(
            PruneStrategy::from_options(Some(2), None, None, None).unwrap(),
            PruneStrategy::KeepLast(2)
        );
    }

    #[test]
    fn test_malformed_timestamp_is_rejected() {
        assert!(matches!(
            PruneStrategy::from_options(None, Some("yesterday"), None, None),
            Err(Error::InvalidStrategy(_))
        ));
        assert_eq!(
            PruneStrategy::from_options(None, Some("2025-01-02 00:00:00"), None, None).unwrap(),
            PruneStrategy::OlderThan(day(1))
        );
    }

    #[test]
    fn test_keep_last_two_of_three() {
        let plan = plan(&fulls(), Some("g"), &PruneStrategy::KeepLast(2));
        assert_eq!(plan.delete_labels(), vec!["day1"]);
        assert!(plan.retained_due_to_dependency.is_empty());
    }

    #[test]
    fn test_keep_last_more_than_available() {
        let plan = plan(&fulls(), None, &PruneStrategy::KeepLast(10));
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn test_older_than_is_strict() {
        let plan = plan(&fulls(), None, &PruneStrategy::OlderThan(day(2)));
        assert_eq!(plan.delete_labels(), vec!["day1"]);
    }

    #[test]
    fn test_snapshots_reports_unknown_and_continues() {
        let strategy = PruneStrategy::Snapshots(vec!["day2".to_string(), "ghost".to_string()]);
        let plan = plan(&fulls(), None, &strategy);
        assert_eq!(plan.delete_labels(), vec!["day2"]);
        assert_eq!(plan.unknown_labels, vec!["ghost".to_string()]);
    }

    #[test]
    fn test_group_filter_hides_other_groups() {
        let mut records = fulls().records().to_vec();
        let mut other = finished("other", BackupType::Full, 0, None);
        other.group = "h".to_string();
        records.push(other);
        let plan = plan(
            &History::new(records),
            Some("g"),
            &PruneStrategy::Snapshot("other".to_string()),
        );
        assert!(plan.delete.is_empty());
        assert_eq!(plan.unknown_labels, vec!["other".to_string()]);
    }

    #[test]
    fn test_baseline_of_retained_incremental_is_protected() {
        let history = History::new(vec![
            finished("full1", BackupType::Full, 1, None),
            finished("inc1", BackupType::Incremental, 2, Some("full1")),
            finished("full2", BackupType::Full, 3, None),
            finished("inc2", BackupType::Incremental, 4, Some("inc1")),
        ]);

        let plan = plan(&history, None, &PruneStrategy::KeepLast(2));
        // full2 and inc2 are kept; inc2 needs inc1 and full1
        assert!(plan.delete.is_empty());
        assert_eq!(plan.retained_due_to_dependency.len(), 2);
        let full1 = plan
            .retained_due_to_dependency
            .iter()
            .find(|r| r.label == "full1")
            .unwrap();
        assert_eq!(full1.dependents, vec!["inc2".to_string()]);
    }

    #[test]
    fn test_chain_deleted_together_is_allowed() {
        let history = History::new(vec![
            finished("full1", BackupType::Full, 1, None),
            finished("inc1", BackupType::Incremental, 2, Some("full1")),
            finished("full2", BackupType::Full, 3, None),
        ]);

        let plan = plan(&history, None, &PruneStrategy::KeepLast(1));
        assert_eq!(plan.delete_labels(), vec!["full1", "inc1"]);
    }

    #[test]
    fn test_in_flight_incremental_protects_its_baseline() {
        let mut running = finished("inc_running", BackupType::Incremental, 5, Some("day3"));
        running.status = BackupStatus::Running;
        running.finished_at = None;
        let mut records = fulls().records().to_vec();
        records.push(running);

        let plan = plan(
            &History::new(records),
            None,
            &PruneStrategy::Snapshot("day3".to_string()),
        );
        assert!(plan.delete.is_empty());
        assert_eq!(plan.retained_due_to_dependency[0].label, "day3");
    }

    #[test]
    fn test_failed_incremental_does_not_protect() {
        let mut failed = finished("inc_failed", BackupType::Incremental, 5, Some("day3"));
        failed.status = BackupStatus::Failed;
        let mut records = fulls().records().to_vec();
        records.push(failed);

        let plan = plan(
            &History::new(records),
            None,
            &PruneStrategy::Snapshot("day3".to_string()),
        );
        assert_eq!(plan.delete_labels(), vec!["day3"]);
    }
}
