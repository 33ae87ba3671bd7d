//! Backup chain resolution
//!
//! An incremental backup is only restorable together with the backups it was
//! taken against. This module answers three questions over a snapshot of
//! backup history:
//!
//! - which backup an incremental should use as its baseline,
//! - which ordered chain (root first) reconstructs a target label,
//! - which backups a given backup transitively depends on.
//!
//! All answers are a pure function of the records passed in. "Most recent"
//! means greatest `finished_at`, with ties broken by the lexically greatest
//! label so results are reproducible.

use crate::types::{BackupRecord, BackupType};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Upper bound on baseline hops before a chain is considered broken
pub const MAX_CHAIN_DEPTH: usize = 64;

/// Backup kinds an incremental may use as its implicit baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselinePolicy {
    allowed: Vec<BackupType>,
}

impl Default for BaselinePolicy {
    fn default() -> Self {
        Self {
            allowed: vec![BackupType::Full, BackupType::Weekly, BackupType::Monthly],
        }
    }
}

impl BaselinePolicy {
    /// Only FULL backups root new incrementals
    pub fn full_only() -> Self {
        Self {
            allowed: vec![BackupType::Full],
        }
    }

    pub fn new(allowed: Vec<BackupType>) -> Result<Self> {
        if allowed.is_empty() {
            return Err(Error::InvalidValue(
                "baseline policy needs at least one backup type".to_string(),
            ));
        }
        if allowed.contains(&BackupType::Incremental) {
            return Err(Error::InvalidValue(
                "incremental backups cannot be implicit baselines".to_string(),
            ));
        }
        Ok(Self { allowed })
    }

    pub fn accepts(&self, backup_type: BackupType) -> bool {
        self.allowed.contains(&backup_type)
    }
}

/// Indexed view over backup history
#[derive(Debug, Clone, Default)]
pub struct History {
    records: Vec<BackupRecord>,
    index: HashMap<String, usize>,
}

impl History {
    pub fn new(records: Vec<BackupRecord>) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.label.clone(), i))
            .collect();
        Self { records, index }
    }

    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    pub fn get(&self, label: &str) -> Option<&BackupRecord> {
        self.index.get(label).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent finished backup of the group that the policy accepts
    pub fn latest_baseline(&self, group: &str, policy: &BaselinePolicy) -> Result<&BackupRecord> {
        self.records
            .iter()
            .filter(|r| r.group == group && r.is_finished() && policy.accepts(r.backup_type))
            .max_by(|a, b| recency_key(a).cmp(&recency_key(b)))
            .ok_or_else(|| Error::NoBaseline {
                group: group.to_string(),
            })
    }

    /// Validate an explicitly named baseline for a backup of `group`
    pub fn validate_baseline(&self, label: &str, group: &str) -> Result<&BackupRecord> {
        let record = self
            .get(label)
            .filter(|r| r.is_finished())
            .ok_or_else(|| Error::BaselineNotFound(label.to_string()))?;

        if record.group != group {
            return Err(Error::BaselineMismatch {
                label: label.to_string(),
                expected: group.to_string(),
                actual: record.group.clone(),
            });
        }

        Ok(record)
    }

    /// Resolve the ordered chain (root first) that reconstructs `target`
    pub fn resolve_chain(&self, target: &str) -> Result<Vec<&BackupRecord>> {
        let mut current = self
            .get(target)
            .ok_or_else(|| Error::UnknownLabel(vec![target.to_string()]))?;

        if !current.is_finished() {
            return Err(Error::BrokenChain {
                label: target.to_string(),
                reason: format!("target backup is {}", current.status),
            });
        }

        let mut chain = vec![current];
        let mut seen: HashSet<&str> = HashSet::from([current.label.as_str()]);

        while !current.backup_type.is_standalone() {
            let baseline = current.baseline_label.as_deref().ok_or_else(|| Error::BrokenChain {
                label: current.label.clone(),
                reason: "incremental backup has no baseline".to_string(),
            })?;

            if chain.len() > MAX_CHAIN_DEPTH {
                return Err(Error::BrokenChain {
                    label: current.label.clone(),
                    reason: format!("chain exceeds {} hops", MAX_CHAIN_DEPTH),
                });
            }

            if !seen.insert(baseline) {
                return Err(Error::BrokenChain {
                    label: current.label.clone(),
                    reason: format!("baseline cycle through '{}'", baseline),
                });
            }

            let next = self.get(baseline).ok_or_else(|| Error::BrokenChain {
                label: current.label.clone(),
                reason: format!("baseline '{}' is missing (pruned?)", baseline),
            })?;

            if !next.is_finished() {
                return Err(Error::BrokenChain {
                    label: current.label.clone(),
                    reason: format!("baseline '{}' is {}", baseline, next.status),
                });
            }

            chain.push(next);
            current = next;
        }

        chain.reverse();
        Ok(chain)
    }

    /// Labels `label` transitively depends on, nearest first.
    ///
    /// Lenient: stops at the first missing link instead of failing, since
    /// callers use it to protect whatever is still present.
    pub fn ancestors(&self, label: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = self.get(label);

        while let Some(record) = current {
            let Some(baseline) = record.baseline_label.as_deref() else {
                break;
            };
            if out.len() >= MAX_CHAIN_DEPTH || !seen.insert(baseline) {
                break;
            }
            out.push(baseline);
            current = self.get(baseline);
        }

        out
    }
}

/// Sort key for "most recent": finished_at (falling back to started_at), then label
pub fn recency_key(record: &BackupRecord) -> (DateTime<Utc>, &str) {
    (
        record.finished_at.unwrap_or(record.started_at),
        record.label.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BackupStatus;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn record(
        label: &str,
        backup_type: BackupType,
        status: BackupStatus,
        finished: i64,
        baseline: Option<&str>,
    ) -> BackupRecord {
        BackupRecord {
            label: label.to_string(),
            backup_type,
            group: "g".to_string(),
            status,
            started_at: day(finished),
            finished_at: Some(day(finished)),
            error_message: None,
            baseline_label: baseline.map(str::to_string),
        }
    }

    fn sample() -> History {
        History::new(vec![
            record("full1", BackupType::Full, BackupStatus::Finished, 1, None),
            record("inc1", BackupType::Incremental, BackupStatus::Finished, 2, Some("full1")),
            record("inc2", BackupType::Incremental, BackupStatus::Finished, 3, Some("inc1")),
            record("weekly1", BackupType::Weekly, BackupStatus::Finished, 4, None),
            record("full2", BackupType::Full, BackupStatus::Failed, 5, None),
        ])
    }

    #[test]
    fn test_latest_baseline_respects_policy_and_status() {
        let history = sample();
        let any = history.latest_baseline("g", &BaselinePolicy::default()).unwrap();
        assert_eq!(any.label, "weekly1");

        let full = history.latest_baseline("g", &BaselinePolicy::full_only()).unwrap();
        assert_eq!(full.label, "full1");
    }

    #[test]
    fn test_latest_baseline_tie_broken_by_label() {
        let history = History::new(vec![
            record("b_full", BackupType::Full, BackupStatus::Finished, 1, None),
            record("a_full", BackupType::Full, BackupStatus::Finished, 1, None),
        ]);
        let baseline = history.latest_baseline("g", &BaselinePolicy::default()).unwrap();
        assert_eq!(baseline.label, "b_full");
    }

    #[test]
    fn test_no_baseline() {
        let history = History::new(vec![record(
            "inc",
            BackupType::Incremental,
            BackupStatus::Finished,
            1,
            Some("gone"),
        )]);
        let err = history.latest_baseline("g", &BaselinePolicy::default()).unwrap_err();
        assert_eq!(err, Error::NoBaseline { group: "g".to_string() });
    }

    #[test]
    fn test_validate_explicit_baseline() {
        let mut records = sample().records().to_vec();
        let mut other = record("other_full", BackupType::Full, BackupStatus::Finished, 1, None);
        other.group = "h".to_string();
        records.push(other);
        let history = History::new(records);

        assert!(history.validate_baseline("full1", "g").is_ok());
        assert_eq!(
            history.validate_baseline("full2", "g").unwrap_err(),
            Error::BaselineNotFound("full2".to_string())
        );
        assert_eq!(
            history.validate_baseline("missing", "g").unwrap_err(),
            Error::BaselineNotFound("missing".to_string())
        );
        assert!(matches!(
            history.validate_baseline("other_full", "g"),
            Err(Error::BaselineMismatch { .. })
        ));
    }

    #[test]
    fn test_resolve_chain_root_first() {
        let history = sample();
        let chain: Vec<&str> = history
            .resolve_chain("inc2")
            .unwrap()
            .iter()
            .map(|r| r.label.as_str())
            .collect();
        assert_eq!(chain, vec!["full1", "inc1", "inc2"]);

        let single = history.resolve_chain("weekly1").unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_resolve_chain_missing_link_is_broken() {
        let history = History::new(vec![
            record("inc1", BackupType::Incremental, BackupStatus::Finished, 2, Some("pruned")),
        ]);
        assert!(matches!(
            history.resolve_chain("inc1"),
            Err(Error::BrokenChain { .. })
        ));
    }

    #[test]
    fn test_resolve_chain_unfinished_link_is_broken() {
        let history = History::new(vec![
            record("full1", BackupType::Full, BackupStatus::FailedPartialPrune, 1, None),
            record("inc1", BackupType::Incremental, BackupStatus::Finished, 2, Some("full1")),
        ]);
        let err = history.resolve_chain("inc1").unwrap_err();
        assert!(matches!(err, Error::BrokenChain { ref label, .. } if label == "inc1"));
    }

    #[test]
    fn test_resolve_chain_detects_cycle() {
        let history = History::new(vec![
            record("a", BackupType::Incremental, BackupStatus::Finished, 1, Some("b")),
            record("b", BackupType::Incremental, BackupStatus::Finished, 2, Some("a")),
        ]);
        assert!(matches!(
            history.resolve_chain("a"),
            Err(Error::BrokenChain { .. })
        ));
    }

    #[test]
    fn test_resolve_unknown_target() {
        assert_eq!(
            sample().resolve_chain("nope").unwrap_err(),
            Error::UnknownLabel(vec!["nope".to_string()])
        );
    }

    #[test]
    fn test_ancestors() {
        let history = sample();
        assert_eq!(history.ancestors("inc2"), vec!["inc1", "full1"]);
        assert!(history.ancestors("full1").is_empty());
    }
}
