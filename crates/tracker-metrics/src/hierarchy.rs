//! Hierarchy resolver consumer: turns every root task's transitive
//! downstream closure into the testing-returns / external-test-returns
//! counts used by the testing-returns and external-test-returns metrics.
//!
//! Two database round-trips for the whole batch of roots, regardless of how
//! many roots or downstream tasks exist: one recursive CTE walk
//! (`hierarchy_downstream_batch`) and one batched history fetch
//! (`histories_for_task_keys`) over the union of every root's downstream
//! keys — never a per-root, let alone per-node, fetch.

use std::collections::HashMap;
use std::time::Duration;

use tracker_model::{HierarchyConfig, StatusMapping};
use tracker_storage::TrackerStorage;

use crate::bounce::filter_bounces;
use crate::error::MetricsError;

/// Return counts accumulated across a root task's entire downstream
/// hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownstreamReturns {
    pub testing_returns: u64,
    pub external_test_returns: u64,
}

/// Resolves every key in `root_keys`' downstream closures in one batched
/// call and counts, independently per root, transitions into the testing
/// status and into any external-test status across that root's closure.
///
/// A root is included in its own closure only if it matches
/// `config.downstream_queue_prefix`, so a root in the upstream queue
/// contributes nothing to its own counts — the whole point of the hierarchy
/// is to aggregate what happened in the *downstream* queue.
pub async fn downstream_returns_batch(
    storage: &dyn TrackerStorage,
    root_keys: &[String],
    config: &HierarchyConfig,
    mapping: &StatusMapping,
    bounce_threshold: Duration,
) -> Result<HashMap<String, DownstreamReturns>, MetricsError> {
    if root_keys.is_empty() {
        return Ok(HashMap::new());
    }

    let downstream_by_root = storage
        .hierarchy_downstream_batch(
            root_keys,
            &config.downstream_queue_prefix,
            &config.link_type_id,
            config.direction,
            config.max_depth,
        )
        .await?;

    let all_keys: Vec<String> = downstream_by_root
        .values()
        .flatten()
        .cloned()
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();
    let histories = if all_keys.is_empty() {
        HashMap::new()
    } else {
        storage.histories_for_task_keys(&all_keys).await?
    };

    let mut out = HashMap::with_capacity(root_keys.len());
    for root_key in root_keys {
        let mut returns = DownstreamReturns::default();
        if let Some(downstream_keys) = downstream_by_root.get(root_key) {
            for key in downstream_keys {
                let Some(history) = histories.get(key) else {
                    continue;
                };
                let filtered = filter_bounces(history, bounce_threshold);
                for entry in &filtered {
                    if mapping.is_testing(&entry.status) {
                        returns.testing_returns += 1;
                    }
                    if mapping.is_external_test(&entry.status) {
                        returns.external_test_returns += 1;
                    }
                }
            }
        }
        out.insert(root_key.clone(), returns);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tracker_model::{LinkDirection, StatusHistoryEntry, Task};
    use tracker_storage::{GroupBy, MetricType, RunOutcomeCounters, StorageError};
    use uuid::Uuid;

    fn dt(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn entry(status: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> StatusHistoryEntry {
        StatusHistoryEntry {
            natural_id: "x".into(),
            status: status.into(),
            status_display: status.into(),
            start_date: start,
            end_date: end,
        }
    }

    fn mapping() -> StatusMapping {
        let mut external_test_statuses = HashSet::new();
        external_test_statuses.insert("external_test".to_string());
        StatusMapping {
            testing_status: "testing".to_string(),
            external_test_statuses,
            ..Default::default()
        }
    }

    /// A fake storage that counts how many times each trait method is
    /// invoked, so the test can assert the O(1)-round-trip bound directly
    /// rather than trusting the implementation.
    struct CountingStorage {
        downstream_calls: AtomicU32,
        histories_calls: AtomicU32,
        downstream: HashMap<String, Vec<String>>,
        histories: HashMap<String, Vec<StatusHistoryEntry>>,
    }

    #[async_trait]
    impl TrackerStorage for CountingStorage {
        async fn upsert_task(&self, _task: &Task) -> Result<bool, StorageError> {
            unimplemented!()
        }
        async fn touch_last_sync(&self, _natural_id: &str, _now: DateTime<Utc>) -> Result<(), StorageError> {
            unimplemented!()
        }
        async fn replace_history(
            &self,
            _natural_id: &str,
            _entries: &[StatusHistoryEntry],
        ) -> Result<(), StorageError> {
            unimplemented!()
        }
        async fn cleanup_duplicate_history(&self) -> Result<u64, StorageError> {
            unimplemented!()
        }
        async fn start_run(&self) -> Result<Uuid, StorageError> {
            unimplemented!()
        }
        async fn complete_run(&self, _id: Uuid, _counters: RunOutcomeCounters) -> Result<(), StorageError> {
            unimplemented!()
        }
        async fn fail_run(
            &self,
            _id: Uuid,
            _error: &str,
            _counters: RunOutcomeCounters,
        ) -> Result<(), StorageError> {
            unimplemented!()
        }
        async fn orphaned_running_runs(&self, _max_age: Duration) -> Result<Vec<Uuid>, StorageError> {
            unimplemented!()
        }
        async fn tasks_in_period(
            &self,
            _start: chrono::NaiveDate,
            _end: chrono::NaiveDate,
            _mapping: &StatusMapping,
            _metric_type: MetricType,
        ) -> Result<Vec<Task>, StorageError> {
            unimplemented!()
        }
        async fn tasks_in_queue(
            &self,
            _queue_prefix: &str,
            _created_since: Option<chrono::NaiveDate>,
        ) -> Result<Vec<Task>, StorageError> {
            unimplemented!()
        }
        async fn root_tasks_in_queue(
            &self,
            _queue_prefix: &str,
            _start_date: Option<chrono::NaiveDate>,
        ) -> Result<Vec<Task>, StorageError> {
            unimplemented!()
        }
        async fn history_for_task(&self, _natural_id: &str) -> Result<Vec<StatusHistoryEntry>, StorageError> {
            unimplemented!()
        }
        async fn histories_for_keys(
            &self,
            _natural_ids: &[String],
        ) -> Result<HashMap<String, Vec<StatusHistoryEntry>>, StorageError> {
            unimplemented!()
        }
        async fn histories_for_task_keys(
            &self,
            _keys: &[String],
        ) -> Result<HashMap<String, Vec<StatusHistoryEntry>>, StorageError> {
            self.histories_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.histories.clone())
        }
        async fn hierarchy_downstream_batch(
            &self,
            _root_keys: &[String],
            _queue_prefix: &str,
            _link_type_id: &str,
            _direction: LinkDirection,
            _max_depth: u32,
        ) -> Result<HashMap<String, Vec<String>>, StorageError> {
            self.downstream_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.downstream.clone())
        }
    }

    #[tokio::test]
    async fn counts_transitions_across_every_root_in_two_round_trips_total() {
        // S5: DOWN-1 has no testing transitions, DOWN-2 has two, DOWN-3 has one.
        let mut histories = HashMap::new();
        histories.insert(
            "DOWN-1".to_string(),
            vec![entry("open", dt(2025, 1, 1), Some(dt(2025, 1, 5)))],
        );
        histories.insert(
            "DOWN-2".to_string(),
            vec![
                entry("testing", dt(2025, 1, 5), Some(dt(2025, 1, 6))),
                entry("failed", dt(2025, 1, 6), Some(dt(2025, 1, 7))),
                entry("testing", dt(2025, 1, 7), None),
            ],
        );
        histories.insert(
            "DOWN-3".to_string(),
            vec![entry("external_test", dt(2025, 2, 1), None)],
        );

        let mut downstream = HashMap::new();
        downstream.insert("UP-1".to_string(), vec!["DOWN-1".to_string(), "DOWN-2".to_string()]);
        downstream.insert("UP-2".to_string(), vec!["DOWN-3".to_string()]);

        let storage = CountingStorage {
            downstream_calls: AtomicU32::new(0),
            histories_calls: AtomicU32::new(0),
            downstream,
            histories,
        };

        let config = HierarchyConfig::default();
        let mapping = mapping();
        let roots = vec!["UP-1".to_string(), "UP-2".to_string()];

        let returns = downstream_returns_batch(&storage, &roots, &config, &mapping, Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(returns["UP-1"].testing_returns, 2);
        assert_eq!(returns["UP-1"].external_test_returns, 0);
        assert_eq!(returns["UP-2"].testing_returns, 0);
        assert_eq!(returns["UP-2"].external_test_returns, 1);
        assert_eq!(storage.downstream_calls.load(Ordering::SeqCst), 1);
        assert_eq!(storage.histories_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_hierarchy_short_circuits_before_the_history_query() {
        let storage = CountingStorage {
            downstream_calls: AtomicU32::new(0),
            histories_calls: AtomicU32::new(0),
            downstream: HashMap::new(),
            histories: HashMap::new(),
        };

        let roots = vec!["UP-1".to_string()];
        let returns = downstream_returns_batch(
            &storage,
            &roots,
            &HierarchyConfig::default(),
            &mapping(),
            Duration::from_secs(300),
        )
        .await
        .unwrap();

        assert_eq!(returns["UP-1"], DownstreamReturns::default());
        assert_eq!(storage.histories_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_roots_short_circuits_before_any_query() {
        let storage = CountingStorage {
            downstream_calls: AtomicU32::new(0),
            histories_calls: AtomicU32::new(0),
            downstream: HashMap::new(),
            histories: HashMap::new(),
        };

        let returns = downstream_returns_batch(
            &storage,
            &[],
            &HierarchyConfig::default(),
            &mapping(),
            Duration::from_secs(300),
        )
        .await
        .unwrap();

        assert!(returns.is_empty());
        assert_eq!(storage.downstream_calls.load(Ordering::SeqCst), 0);
        assert_eq!(storage.histories_calls.load(Ordering::SeqCst), 0);
    }
}
