//! The `Task` entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::link::TaskLink;

/// One issue in the remote tracker, as materialized in local storage.
///
/// `natural_id` is the tracker's opaque internal identifier and is the
/// natural key used for upsert; `key` is the human-facing `QUEUE-N` form and
/// is unique but may in principle be rewritten upstream (queue moves), which
/// is why `natural_id` and not `key` anchors the upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub natural_id: String,
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
    pub status: String,
    pub author: Option<String>,
    pub assignee: Option<String>,
    pub team: Option<String>,
    pub business_client: Option<String>,
    pub product_team: Option<String>,
    pub profit_forecast: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_sync_at: DateTime<Utc>,
    pub links: Vec<TaskLink>,
}

impl Task {
    /// Queue prefix of this task's human key, e.g. `"UP"` for `"UP-123"`.
    pub fn queue_prefix(&self) -> &str {
        self.key.split('-').next().unwrap_or(&self.key)
    }
}
