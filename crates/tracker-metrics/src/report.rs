//! CSV terminal sinks: the three report variants share the
//! [`crate::pipeline`] read path and differ only in how they shape rows and
//! which file they write.

use std::path::Path;

use serde::Serialize;

use crate::error::MetricsError;
use crate::pipeline::{StatusTimeRow, SubepicReturns, TaskDetail};
use crate::stats::{mean, percentile_85};

/// One row of the `ttm-details` report, in the exact column order the CLI
/// contract specifies.
#[derive(Debug, Serialize)]
pub struct DetailRow {
    pub key: String,
    pub summary: String,
    pub author: String,
    pub team: String,
    pub group_key: String,
    pub quarter_ttd: Option<String>,
    pub quarter_ttm: Option<String>,
    pub ttd: Option<i64>,
    pub ttm: Option<i64>,
    pub devlt: Option<i64>,
    pub tail: Option<i64>,
    pub pause: Option<i64>,
    pub ttd_pause: Option<i64>,
    pub discovery_backlog_days: i64,
    pub ready_for_dev_days: i64,
    pub testing_returns: u64,
    pub external_test_returns: u64,
}

impl From<TaskDetail> for DetailRow {
    fn from(detail: TaskDetail) -> Self {
        Self {
            key: detail.task.key,
            summary: detail.task.summary,
            author: detail.task.author.unwrap_or_default(),
            team: detail.task.team.unwrap_or_default(),
            group_key: detail.group_key,
            quarter_ttd: detail.metrics.quarter_ttd,
            quarter_ttm: detail.metrics.quarter_ttm,
            ttd: detail.metrics.ttd_days,
            ttm: detail.metrics.ttm_days,
            devlt: detail.metrics.dev_lt_days,
            tail: detail.metrics.tail_days,
            pause: detail.metrics.pause_days,
            ttd_pause: detail.metrics.ttd_pause_days,
            discovery_backlog_days: detail.metrics.discovery_backlog_days,
            ready_for_dev_days: detail.metrics.ready_for_dev_days,
            testing_returns: detail.testing_returns,
            external_test_returns: detail.external_test_returns,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubepicReturnRow {
    pub key: String,
    pub summary: String,
    pub testing_returns: u64,
    pub external_test_returns: u64,
}

impl From<SubepicReturns> for SubepicReturnRow {
    fn from(r: SubepicReturns) -> Self {
        Self {
            key: r.task.key,
            summary: r.task.summary,
            testing_returns: r.testing_returns,
            external_test_returns: r.external_test_returns,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusTimeCsvRow {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub days: i64,
}

impl From<StatusTimeRow> for StatusTimeCsvRow {
    fn from(r: StatusTimeRow) -> Self {
        Self {
            key: r.task_key,
            summary: r.summary,
            status: r.status,
            days: r.days,
        }
    }
}

/// One `(quarter, group)` cell of the aggregated-by-quarter view:
/// count/mean/P85 per metric, with the pause figures drawn from the
/// identical series used to deduct the paired delivery metric.
#[derive(Debug, Serialize)]
pub struct AggregateRow {
    pub quarter: String,
    pub group_key: String,
    pub count: usize,
    pub ttd_mean: Option<f64>,
    pub ttd_p85: Option<i64>,
    pub ttd_pause_mean: Option<f64>,
    pub ttd_pause_p85: Option<i64>,
    pub ttm_mean: Option<f64>,
    pub ttm_p85: Option<i64>,
    pub pause_mean: Option<f64>,
    pub pause_p85: Option<i64>,
}

/// Aggregates `rows` by `(quarter_ttd, group_key)` for TTD-series stats and
/// `(quarter_ttm, group_key)` for TTM-series stats, then merges the two
/// views on their shared key. Rows with no bucket for a given metric simply
/// don't contribute a sample to that metric's cell.
pub fn aggregate_by_quarter(rows: &[DetailRow]) -> Vec<AggregateRow> {
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Cell {
        ttd: Vec<i64>,
        ttd_pause: Vec<i64>,
        ttm: Vec<i64>,
        pause: Vec<i64>,
    }

    let mut cells: BTreeMap<(String, String), Cell> = BTreeMap::new();

    for row in rows {
        if let (Some(quarter), Some(ttd)) = (&row.quarter_ttd, row.ttd) {
            let cell = cells.entry((quarter.clone(), row.group_key.clone())).or_default();
            cell.ttd.push(ttd);
            if let Some(p) = row.ttd_pause {
                cell.ttd_pause.push(p);
            }
        }
        if let (Some(quarter), Some(ttm)) = (&row.quarter_ttm, row.ttm) {
            let cell = cells.entry((quarter.clone(), row.group_key.clone())).or_default();
            cell.ttm.push(ttm);
            if let Some(p) = row.pause {
                cell.pause.push(p);
            }
        }
    }

    cells
        .into_iter()
        .map(|((quarter, group_key), cell)| AggregateRow {
            quarter,
            group_key,
            count: cell.ttd.len().max(cell.ttm.len()),
            ttd_mean: mean(&cell.ttd),
            ttd_p85: percentile_85(&cell.ttd),
            ttd_pause_mean: mean(&cell.ttd_pause),
            ttd_pause_p85: percentile_85(&cell.ttd_pause),
            ttm_mean: mean(&cell.ttm),
            ttm_p85: percentile_85(&cell.ttm),
            pause_mean: mean(&cell.pause),
            pause_p85: percentile_85(&cell.pause),
        })
        .collect()
}

/// Writes `rows` to `path` as UTF-8, comma-separated, with a header row.
/// Shared by all three report CLI subcommands plus the optional
/// aggregate sink.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), MetricsError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
