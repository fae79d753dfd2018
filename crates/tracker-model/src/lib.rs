//! Shared domain types for the tracker sync/metrics engine.
//!
//! Kept dependency-free of any I/O so every other crate in the workspace
//! (`tracker-http`, `tracker-storage`, `tracker-history`, `tracker-metrics`,
//! `tracker-sync`) can depend on it without pulling in `reqwest` or `sqlx`.

pub mod config;
pub mod error;
pub mod hierarchy_config;
pub mod history;
pub mod link;
pub mod quarter;
pub mod status_mapping;
pub mod sync_run;
pub mod task;

pub use config::TrackerConfig;
pub use error::ModelError;
pub use hierarchy_config::HierarchyConfig;
pub use history::StatusHistoryEntry;
pub use link::{LinkDirection, TaskLink};
pub use quarter::{QuarterConfig, QuarterSet};
pub use status_mapping::StatusMapping;
pub use sync_run::{RunCounters, RunStatus, SyncRunLog};
pub use task::Task;
