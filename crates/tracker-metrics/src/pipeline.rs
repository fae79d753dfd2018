//! Batched read pipeline shared by all three report variants.
//!
//! Each report is a different terminal aggregator over the same shape of
//! work: one query to select in-scope tasks, one batched query to load all
//! their histories, then a pure in-memory fold per task. No per-task History
//! query — that would reintroduce the N+1 the design explicitly forbids.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracker_model::{HierarchyConfig, QuarterSet, StatusHistoryEntry, StatusMapping, Task};
use tracker_storage::{GroupBy, MetricType, TrackerStorage};

use crate::bounce::filter_bounces;
use crate::error::MetricsError;
use crate::hierarchy::downstream_returns_batch;
use crate::metrics::{compute_task_metrics, TaskMetrics};

/// One task plus its bounce-filtered history and derived metrics — the unit
/// the `ttm-details` report is built from.
pub struct TaskDetail {
    pub task: Task,
    pub group_key: String,
    pub metrics: TaskMetrics,
    pub testing_returns: u64,
    pub external_test_returns: u64,
}

/// Loads every task whose TTD or TTM anchor falls in `[start, end]`, their
/// histories in one batched query, and computes metrics + hierarchy return
/// counts for each.
pub async fn collect_ttm_details(
    storage: &dyn TrackerStorage,
    start: NaiveDate,
    end: NaiveDate,
    mapping: &StatusMapping,
    quarters: &QuarterSet,
    hierarchy: &HierarchyConfig,
    group_by: GroupBy,
    bounce_threshold: Duration,
    as_of: Option<DateTime<Utc>>,
) -> Result<Vec<TaskDetail>, MetricsError> {
    let mut tasks = storage
        .tasks_in_period(start, end, mapping, MetricType::Ttd)
        .await?;
    let ttm_tasks = storage
        .tasks_in_period(start, end, mapping, MetricType::Ttm)
        .await?;

    let mut seen: std::collections::HashSet<String> =
        tasks.iter().map(|t| t.natural_id.clone()).collect();
    for task in ttm_tasks {
        if seen.insert(task.natural_id.clone()) {
            tasks.push(task);
        }
    }

    let natural_ids: Vec<String> = tasks.iter().map(|t| t.natural_id.clone()).collect();
    let histories = storage.histories_for_keys(&natural_ids).await?;

    let root_keys: Vec<String> = tasks.iter().map(|t| t.key.clone()).collect();
    let returns_by_root =
        downstream_returns_batch(storage, &root_keys, hierarchy, mapping, bounce_threshold).await?;

    let mut details = Vec::with_capacity(tasks.len());
    for task in tasks {
        let history = histories.get(&task.natural_id).cloned().unwrap_or_default();
        let filtered = filter_bounces(&history, bounce_threshold);
        let metrics = compute_task_metrics(&filtered, task.created_at, mapping, quarters, as_of);

        let returns = returns_by_root.get(&task.key).copied().unwrap_or_default();

        details.push(TaskDetail {
            group_key: group_by.group_key(&task),
            testing_returns: returns.testing_returns,
            external_test_returns: returns.external_test_returns,
            task,
            metrics,
        });
    }

    Ok(details)
}

/// One root task plus the return counts aggregated over its whole downstream
/// closure.
pub struct SubepicReturns {
    pub task: Task,
    pub testing_returns: u64,
    pub external_test_returns: u64,
}

/// Loads every root task in `queue_prefix` created on/after `start_date` and
/// resolves its downstream return counts.
pub async fn collect_subepic_returns(
    storage: &dyn TrackerStorage,
    queue_prefix: &str,
    start_date: Option<NaiveDate>,
    mapping: &StatusMapping,
    hierarchy: &HierarchyConfig,
    bounce_threshold: Duration,
) -> Result<Vec<SubepicReturns>, MetricsError> {
    let roots = storage.root_tasks_in_queue(queue_prefix, start_date).await?;

    let root_keys: Vec<String> = roots.iter().map(|t| t.key.clone()).collect();
    let returns_by_root =
        downstream_returns_batch(storage, &root_keys, hierarchy, mapping, bounce_threshold).await?;

    let mut out = Vec::with_capacity(roots.len());
    for task in roots {
        let returns = returns_by_root.get(&task.key).copied().unwrap_or_default();
        out.push(SubepicReturns {
            task,
            testing_returns: returns.testing_returns,
            external_test_returns: returns.external_test_returns,
        });
    }
    Ok(out)
}

/// One task's cumulative time (in whole days, as-of now) in one status.
pub struct StatusTimeRow {
    pub task_key: String,
    pub summary: String,
    pub status: String,
    pub days: i64,
}

/// Loads every task in `queue_prefix` (optionally filtered by creation date)
/// and its full history in one batched query, then folds each task's
/// intervals into per-status day totals.
pub async fn collect_status_time(
    storage: &dyn TrackerStorage,
    queue_prefix: &str,
    created_since: Option<NaiveDate>,
    as_of: DateTime<Utc>,
) -> Result<Vec<StatusTimeRow>, MetricsError> {
    let tasks = storage.tasks_in_queue(queue_prefix, created_since).await?;
    let natural_ids: Vec<String> = tasks.iter().map(|t| t.natural_id.clone()).collect();
    let histories = storage.histories_for_keys(&natural_ids).await?;

    let mut rows = Vec::new();
    for task in &tasks {
        let history: &[StatusHistoryEntry] = histories
            .get(&task.natural_id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut by_status: HashMap<&str, i64> = HashMap::new();
        for entry in history {
            let days = entry.duration_as_of(as_of).num_days().max(0);
            *by_status.entry(entry.status.as_str()).or_insert(0) += days;
        }

        let mut statuses: Vec<&str> = by_status.keys().copied().collect();
        statuses.sort_unstable();
        for status in statuses {
            rows.push(StatusTimeRow {
                task_key: task.key.clone(),
                summary: task.summary.clone(),
                status: status.to_string(),
                days: by_status[status],
            });
        }
    }

    Ok(rows)
}
