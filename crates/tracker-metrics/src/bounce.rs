//! Short-transition ("bounce") filter.
//!
//! Applied once, metric-side only, before any of the ten metrics are
//! computed. Storage keeps the full, faithful history; this is a pure
//! projection over a copy and never mutates or re-derives storage state.

use std::time::Duration;

use tracker_model::StatusHistoryEntry;

/// Drops closed intervals shorter than `threshold`. The final, currently
/// open interval is never dropped — its duration depends on "now"/`as_of`,
/// not a fixed span, and it represents the task's actual current status.
pub fn filter_bounces(history: &[StatusHistoryEntry], threshold: Duration) -> Vec<StatusHistoryEntry> {
    let threshold = chrono::Duration::from_std(threshold).unwrap_or_default();

    history
        .iter()
        .filter(|entry| match entry.end_date {
            Some(end) => (end - entry.start_date) >= threshold,
            None => true,
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    fn entry(status: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> StatusHistoryEntry {
        StatusHistoryEntry {
            natural_id: "1".into(),
            status: status.into(),
            status_display: status.into(),
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn drops_short_closed_interval_keeps_the_rest() {
        let history = vec![
            entry("open", dt(2025, 1, 1, 0, 0), Some(dt(2025, 1, 5, 0, 0))),
            entry(
                "ready_for_dev",
                dt(2025, 1, 6, 0, 0),
                Some(dt(2025, 1, 6, 0, 2)),
            ),
            entry("discovery", dt(2025, 1, 6, 0, 2), Some(dt(2025, 1, 15, 0, 0))),
            entry("ready_for_dev", dt(2025, 1, 15, 0, 0), None),
        ];

        let filtered = filter_bounces(&history, Duration::from_secs(300));

        assert_eq!(filtered.len(), 3);
        assert!(filtered.iter().all(|e| e.status != "ready_for_dev" || e.end_date.is_none()));
    }

    #[test]
    fn never_drops_the_open_interval() {
        let history = vec![entry("discovery", dt(2025, 1, 1, 0, 0), None)];
        let filtered = filter_bounces(&history, Duration::from_secs(300));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn never_introduces_a_status_not_in_the_input() {
        let history = vec![
            entry("open", dt(2025, 1, 1, 0, 0), Some(dt(2025, 1, 1, 0, 1))),
            entry("discovery", dt(2025, 1, 1, 0, 1), None),
        ];
        let filtered = filter_bounces(&history, Duration::from_secs(300));
        let statuses: std::collections::HashSet<_> = filtered.iter().map(|e| e.status.as_str()).collect();
        let original: std::collections::HashSet<_> = history.iter().map(|e| e.status.as_str()).collect();
        assert!(statuses.is_subset(&original));
    }
}
