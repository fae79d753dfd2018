//! Wire-format DTOs for the remote tracker's JSON responses.
//!
//! Kept deliberately distinct from `tracker_model::Task`: these mirror what
//! the remote API actually sends, and the sync orchestrator is responsible
//! for mapping them onto the domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusValue {
    pub key: String,
    pub display: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteLink {
    #[serde(rename = "type")]
    pub link_type_id: String,
    pub direction: String,
    #[serde(rename = "object")]
    pub target_key: String,
}

/// A task record as returned by `get_task` / `get_tasks_batch`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteTask {
    pub id: String,
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
    pub status: StatusValue,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub business_client: Option<String>,
    #[serde(default)]
    pub product_team: Option<String>,
    #[serde(default)]
    pub profit_forecast: Option<f64>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub links: Vec<RemoteLink>,
}

/// One field diff inside a changelog event. Only status diffs matter to the
/// history reconstructor; other fields are carried through unparsed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(default)]
    pub from_status: Option<StatusValue>,
    #[serde(default)]
    pub to_status: Option<StatusValue>,
}

/// One changelog entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChangeEvent {
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: Vec<FieldChange>,
}

/// One page of a scroll-paginated search response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrollPage {
    pub issues: Vec<ScrollIssue>,
    #[serde(default)]
    pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScrollIssue {
    pub id: String,
    pub key: String,
}
