//! Per-task delivery metrics: TTD, TTM, DevLT, Tail, Pause, TTD-Pause,
//! discovery-backlog days, ready-for-dev days, and the quarter each task
//! buckets into.
//!
//! Every duration metric follows the same shape: find the interval that
//! marks the metric's target status, take its anchor timestamp (fixed if the
//! interval is closed, `as_of`-dependent if it is still open), and subtract
//! accumulated pause time up to that anchor.

use chrono::{DateTime, NaiveDate, Utc};
use tracker_model::{QuarterSet, StatusHistoryEntry, StatusMapping};

use crate::pause::pause_up_to;

/// The ten delivery metrics computed for one task from one (bounce-filtered)
/// history. `None` means the metric does not yet apply to this task
/// (the anchor status was never reached and no `as_of` was given to make it
/// provisional).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskMetrics {
    pub ttd_days: Option<i64>,
    pub ttm_days: Option<i64>,
    pub dev_lt_days: Option<i64>,
    pub tail_days: Option<i64>,
    pub pause_days: Option<i64>,
    pub ttd_pause_days: Option<i64>,
    pub discovery_backlog_days: i64,
    pub ready_for_dev_days: i64,
    pub quarter_ttd: Option<String>,
    pub quarter_ttm: Option<String>,
}

/// Resolves the anchor timestamp for an interval that marks the end of a
/// metric's span: its `end_date` if closed, otherwise `as_of` if given, else
/// the interval's own `start_date` — never a real wall-clock "now".
fn anchor_end(entry: &StatusHistoryEntry, as_of: Option<DateTime<Utc>>) -> DateTime<Utc> {
    entry.end_date.unwrap_or_else(|| as_of.unwrap_or(entry.start_date))
}

fn first_matching<'a>(
    history: &'a [StatusHistoryEntry],
    pred: impl Fn(&str) -> bool,
) -> Option<&'a StatusHistoryEntry> {
    history.iter().filter(|e| pred(&e.status)).min_by_key(|e| e.start_date)
}

fn first_matching_at_or_after<'a>(
    history: &'a [StatusHistoryEntry],
    after: DateTime<Utc>,
    pred: impl Fn(&str) -> bool,
) -> Option<&'a StatusHistoryEntry> {
    history
        .iter()
        .filter(|e| e.start_date >= after && pred(&e.status))
        .min_by_key(|e| e.start_date)
}

fn span_days(
    history: &[StatusHistoryEntry],
    mapping: &StatusMapping,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> i64 {
    let elapsed = end - start - pause_up_to(history, mapping, end);
    elapsed.num_days().max(0)
}

/// Computes all ten metrics for one task. `history` should already
/// have been bounce-filtered by the caller.
pub fn compute_task_metrics(
    history: &[StatusHistoryEntry],
    created_at: DateTime<Utc>,
    mapping: &StatusMapping,
    quarters: &QuarterSet,
    as_of: Option<DateTime<Utc>>,
) -> TaskMetrics {
    let mut history: Vec<StatusHistoryEntry> = history.to_vec();
    history.sort_by_key(|e| e.start_date);

    let ttd_entry = first_matching(&history, |s| mapping.is_ready_for_dev(s));
    let ttd_end = ttd_entry.map(|e| anchor_end(e, as_of));
    let ttd_days = ttd_end.map(|end| span_days(&history, mapping, created_at, end));

    let ttm_entry = first_matching(&history, |s| mapping.is_done(s));
    let ttm_end = ttm_entry.map(|e| anchor_end(e, as_of));
    let ttm_days = ttm_end.map(|end| span_days(&history, mapping, created_at, end));

    let dev_lt_days = first_matching(&history, |s| mapping.is_in_work(s)).and_then(|start_entry| {
        let start = start_entry.start_date;
        match first_matching_at_or_after(&history, start, |s| mapping.is_external_test(s)) {
            Some(end_entry) => Some(span_days(&history, mapping, start, anchor_end(end_entry, as_of))),
            None => as_of.map(|end| span_days(&history, mapping, start, end)),
        }
    });

    // Tail: elapsed time from the first exit out of an external-test status
    // to the first subsequent entry into a done status. If the task
    // is still inside that external-test interval, no tail phase has begun
    // yet: with `as_of` given the metric is provisionally zero, otherwise
    // unknown.
    let tail_days = first_matching(&history, |s| mapping.is_external_test(s)).and_then(|ext_entry| {
        match ext_entry.end_date {
            None => as_of.map(|_| 0),
            Some(exit) => match first_matching_at_or_after(&history, exit, |s| mapping.is_done(s)) {
                Some(end_entry) => Some(span_days(&history, mapping, exit, anchor_end(end_entry, as_of))),
                None => as_of.map(|end| span_days(&history, mapping, exit, end)),
            },
        }
    });

    let pause_days = ttm_end.map(|end| pause_up_to(&history, mapping, end).num_days().max(0));
    let ttd_pause_days = ttd_end.map(|end| pause_up_to(&history, mapping, end).num_days().max(0));

    let as_of_for_open = as_of.unwrap_or(created_at);
    let discovery_backlog_days = history
        .iter()
        .filter(|e| mapping.is_discovery(&e.status))
        .map(|e| e.duration_as_of(as_of_for_open).num_days().max(0))
        .sum();
    let ready_for_dev_days = history
        .iter()
        .filter(|e| mapping.is_ready_for_dev(&e.status))
        .map(|e| e.duration_as_of(as_of_for_open).num_days().max(0))
        .sum();

    let quarter_ttd = ttd_end.and_then(|end| quarter_name(quarters, end));
    let quarter_ttm = ttm_end.and_then(|end| quarter_name(quarters, end));

    TaskMetrics {
        ttd_days,
        ttm_days,
        dev_lt_days,
        tail_days,
        pause_days,
        ttd_pause_days,
        discovery_backlog_days,
        ready_for_dev_days,
        quarter_ttd,
        quarter_ttm,
    }
}

fn quarter_name(quarters: &QuarterSet, at: DateTime<Utc>) -> Option<String> {
    quarter_bucket(quarters, at.date_naive()).map(|q| q.to_string())
}

fn quarter_bucket(quarters: &QuarterSet, date: NaiveDate) -> Option<&str> {
    quarters.bucket_for(date).map(|q| q.name.as_str())
}
