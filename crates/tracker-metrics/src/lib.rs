//! Delivery-lifecycle metric engine: bounce filter, pause accounting,
//! the ten per-task metrics, quarter bucketing, aggregated statistics, and
//! the CSV sinks for the three report variants.
//!
//! Reads are batched: one query for in-scope tasks, one batched query for
//! their histories, one batched query across every root for the downstream
//! hierarchy — never a per-task N+1.

pub mod bounce;
pub mod error;
pub mod hierarchy;
pub mod metrics;
pub mod pause;
pub mod pipeline;
pub mod report;
pub mod stats;

pub use bounce::filter_bounces;
pub use error::MetricsError;
pub use hierarchy::{downstream_returns_batch, DownstreamReturns};
pub use metrics::{compute_task_metrics, TaskMetrics};
pub use pause::{pause_between, pause_up_to};
pub use pipeline::{collect_status_time, collect_subepic_returns, collect_ttm_details, StatusTimeRow, SubepicReturns, TaskDetail};
pub use report::{aggregate_by_quarter, write_csv, AggregateRow, DetailRow, StatusTimeCsvRow, SubepicReturnRow};
