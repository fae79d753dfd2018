//! The `SyncRunLog` entity — one audit row per sync invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(ModelError::InvalidRunStatus(other.to_string())),
        }
    }
}

/// Audit row for one sync invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunLog {
    pub id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub tasks_processed: i64,
    pub tasks_created: i64,
    pub tasks_updated: i64,
    pub history_entries_processed: i64,
    pub errors_count: i64,
    pub error_message: Option<String>,
}

impl SyncRunLog {
    pub fn started(id: uuid::Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            completed_at: None,
            status: RunStatus::Running,
            tasks_processed: 0,
            tasks_created: 0,
            tasks_updated: 0,
            history_entries_processed: 0,
            errors_count: 0,
            error_message: None,
        }
    }
}

/// Counters accumulated during a sync run, merged into a `SyncRunLog` at the end.
///
/// Mutated under a mutex shared by the worker pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunCounters {
    pub tasks_processed: i64,
    pub tasks_created: i64,
    pub tasks_updated: i64,
    pub history_entries_processed: i64,
    pub errors_count: i64,
}

impl RunCounters {
    pub fn merge(&mut self, other: RunCounters) {
        self.tasks_processed += other.tasks_processed;
        self.tasks_created += other.tasks_created;
        self.tasks_updated += other.tasks_updated;
        self.history_entries_processed += other.history_entries_processed;
        self.errors_count += other.errors_count;
    }
}
