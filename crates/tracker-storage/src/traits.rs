//! The `TrackerStorage` trait and supporting query types.
//!
//! One trait, multiple backends (`sqlite`, `postgres`) implementing it
//! identically, so callers (the sync orchestrator, the metrics engine) stay
//! backend-agnostic.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracker_model::{LinkDirection, RunCounters, StatusHistoryEntry, StatusMapping, Task};
use uuid::Uuid;

use crate::error::StorageError;

/// Grouping dimension for metrics reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Author,
    Team,
}

impl GroupBy {
    pub fn group_key(&self, task: &Task) -> String {
        match self {
            GroupBy::Author => task.author.clone().unwrap_or_default(),
            GroupBy::Team => task.team.clone().unwrap_or_default(),
        }
    }
}

/// Which metric's anchor status set `tasks_in_period` should filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Anchored on entries into the "ready-for-dev" status.
    Ttd,
    /// Anchored on entries into any `done_statuses`.
    Ttm,
}

/// Counters carried into `complete_run`/`fail_run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOutcomeCounters {
    pub tasks_processed: i64,
    pub tasks_created: i64,
    pub tasks_updated: i64,
    pub history_entries_processed: i64,
    pub errors_count: i64,
}

impl From<RunCounters> for RunOutcomeCounters {
    fn from(c: RunCounters) -> Self {
        Self {
            tasks_processed: c.tasks_processed,
            tasks_created: c.tasks_created,
            tasks_updated: c.tasks_updated,
            history_entries_processed: c.history_entries_processed,
            errors_count: c.errors_count,
        }
    }
}

/// The persistence layer's full operation set.
///
/// Every write that touches more than one row for a single task is
/// transactional: `replace_history` and `upsert_task` never leave partial
/// rows visible to another connection.
#[async_trait]
pub trait TrackerStorage: Send + Sync {
    /// Inserts or updates a task by `natural_id`. Returns `true` if the row
    /// was newly created.
    async fn upsert_task(&self, task: &Task) -> Result<bool, StorageError>;

    /// Sets `last_sync_at` for a task, independent of the rest of the upsert.
    async fn touch_last_sync(
        &self,
        natural_id: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StorageError>;

    /// Deletes existing history for `natural_id` and inserts `entries` in one
    /// transaction. The only sanctioned mutation
    /// path for history.
    async fn replace_history(
        &self,
        natural_id: &str,
        entries: &[StatusHistoryEntry],
    ) -> Result<(), StorageError>;

    /// Removes exact duplicates on `(task_id, status, start_date)`, keeping
    /// the oldest by insertion order.
    /// Returns the number of rows removed. Idempotent: a second call removes
    /// zero rows.
    async fn cleanup_duplicate_history(&self) -> Result<u64, StorageError>;

    /// Creates a `SyncRunLog` row with `status=running` and returns its id.
    async fn start_run(&self) -> Result<Uuid, StorageError>;

    /// Finalizes a run as `completed` with the accumulated counters.
    async fn complete_run(&self, id: Uuid, counters: RunOutcomeCounters) -> Result<(), StorageError>;

    /// Finalizes a run as `failed` with an error message and whatever
    /// counters were accumulated before the failure.
    async fn fail_run(
        &self,
        id: Uuid,
        error: &str,
        counters: RunOutcomeCounters,
    ) -> Result<(), StorageError>;

    /// Run ids whose `status=running` row is older than `max_age` — orphaned
    /// by a crashed process.
    async fn orphaned_running_runs(&self, max_age: Duration) -> Result<Vec<Uuid>, StorageError>;

    /// Tasks whose anchor date for `metric_type` falls within `[start, end]`.
    /// One query; the metrics engine computes the exact per-metric anchor from
    /// the full history loaded separately via `histories_for_keys`, so this is
    /// a coarse, correct-by-construction pre-filter rather than the final
    /// bucketing decision.
    async fn tasks_in_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        mapping: &StatusMapping,
        metric_type: MetricType,
    ) -> Result<Vec<Task>, StorageError>;

    /// All tasks in `queue_prefix`, optionally filtered by `created_at >=
    /// created_since`.
    async fn tasks_in_queue(
        &self,
        queue_prefix: &str,
        created_since: Option<NaiveDate>,
    ) -> Result<Vec<Task>, StorageError>;

    /// All tasks whose key matches `queue_prefix` and were created on/after
    /// `start_date`.
    async fn root_tasks_in_queue(
        &self,
        queue_prefix: &str,
        start_date: Option<NaiveDate>,
    ) -> Result<Vec<Task>, StorageError>;

    /// Full history for one task.
    async fn history_for_task(&self, natural_id: &str) -> Result<Vec<StatusHistoryEntry>, StorageError>;

    /// Histories for a batch of tasks in one query, keyed by `natural_id`.
    async fn histories_for_keys(
        &self,
        natural_ids: &[String],
    ) -> Result<HashMap<String, Vec<StatusHistoryEntry>>, StorageError>;

    /// Histories for a batch of tasks addressed by human `key` (`QUEUE-N`)
    /// rather than `natural_id`, keyed by `key` in the result. Used by the
    /// hierarchy resolver, whose `hierarchy_downstream_batch` output is a set
    /// of keys, to batch-load downstream histories in one query.
    async fn histories_for_task_keys(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, Vec<StatusHistoryEntry>>, StorageError>;

    /// Transitive downstream closure over the link graph for a whole set of
    /// roots in one recursive SQL walk, depth-bounded, keyed by `root_key` in
    /// the result. A root is included in its own entry if it matches
    /// `queue_prefix`. Callers resolving many roots (a `ttm-details` or
    /// `fullstack-subepic-returns` run) must call this once for the whole
    /// batch rather than once per root, or the hierarchy resolver becomes a
    /// per-task query again.
    async fn hierarchy_downstream_batch(
        &self,
        root_keys: &[String],
        queue_prefix: &str,
        link_type_id: &str,
        direction: LinkDirection,
        max_depth: u32,
    ) -> Result<HashMap<String, Vec<String>>, StorageError>;
}
