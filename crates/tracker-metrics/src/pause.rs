//! Pause accounting: time excluded from delivery metrics because the
//! task sat in a configured pause status.

use chrono::{DateTime, Utc};
use tracker_model::{StatusHistoryEntry, StatusMapping};

/// Total time spent in any pause status, in intervals starting before `d`.
/// An interval crossing `d` contributes only the portion before `d`.
pub fn pause_up_to(history: &[StatusHistoryEntry], mapping: &StatusMapping, d: DateTime<Utc>) -> chrono::Duration {
    let mut total = chrono::Duration::zero();

    for entry in history {
        if !mapping.is_pause(&entry.status) || entry.start_date >= d {
            continue;
        }
        let end = entry.end_date.unwrap_or(d).min(d);
        if end > entry.start_date {
            total += end - entry.start_date;
        }
    }

    total
}

/// Total time spent in any pause status, restricted to the window `[a, b]`.
pub fn pause_between(
    history: &[StatusHistoryEntry],
    mapping: &StatusMapping,
    a: DateTime<Utc>,
    b: DateTime<Utc>,
) -> chrono::Duration {
    let mut total = chrono::Duration::zero();

    for entry in history {
        if !mapping.is_pause(&entry.status) {
            continue;
        }
        let start = entry.start_date.max(a);
        let end = entry.end_date.unwrap_or(b).min(b);
        if end > start {
            total += end - start;
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn dt(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn mapping() -> StatusMapping {
        let mut pause_statuses = HashSet::new();
        pause_statuses.insert("paused".to_string());
        StatusMapping {
            pause_statuses,
            ..Default::default()
        }
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
    fn pause_up_to_counts_only_the_portion_before_d() {
        let history = vec![
            entry("discovery", dt(2025, 1, 1), Some(dt(2025, 1, 8))),
            entry("paused", dt(2025, 1, 8), Some(dt(2025, 1, 10))),
            entry("discovery", dt(2025, 1, 10), Some(dt(2025, 1, 15))),
        ];
        let mapping = mapping();

        // S2 scenario: pause fully before d.
        let pause = pause_up_to(&history, &mapping, dt(2025, 1, 15));
        assert_eq!(pause, chrono::Duration::days(2));

        // d falls inside the pause interval: only the portion before d counts.
        let pause = pause_up_to(&history, &mapping, dt(2025, 1, 9));
        assert_eq!(pause, chrono::Duration::days(1));

        // d before the pause interval starts: nothing counted.
        let pause = pause_up_to(&history, &mapping, dt(2025, 1, 8));
        assert_eq!(pause, chrono::Duration::zero());
    }

    #[test]
    fn pause_between_restricts_to_window() {
        let history = vec![entry("paused", dt(2025, 1, 5), Some(dt(2025, 1, 20)))];
        let mapping = mapping();

        let pause = pause_between(&history, &mapping, dt(2025, 1, 8), dt(2025, 1, 12));
        assert_eq!(pause, chrono::Duration::days(4));
    }

    #[test]
    fn open_pause_interval_is_cut_at_d() {
        let history = vec![entry("paused", dt(2025, 1, 5), None)];
        let mapping = mapping();

        let pause = pause_up_to(&history, &mapping, dt(2025, 1, 10));
        assert_eq!(pause, chrono::Duration::days(5));
    }
}
