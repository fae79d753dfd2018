//! The `StatusHistoryEntry` entity — one interval a task held one status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One interval during which a task held one status.
///
/// `end_date = None` marks the currently-open interval; per task at most one
/// entry may be open at a time, and intervals are non-overlapping
/// and start-sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub natural_id: String,
    pub status: String,
    pub status_display: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl StatusHistoryEntry {
    /// Duration of this interval as of `as_of` (open intervals are cut there).
    pub fn duration_as_of(&self, as_of: DateTime<Utc>) -> chrono::Duration {
        let end = match self.end_date {
            Some(end) => end,
            None => as_of.max(self.start_date),
        };
        end - self.start_date
    }

    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn open_interval_is_cut_at_as_of() {
        let entry = StatusHistoryEntry {
            natural_id: "1".into(),
            status: "ready_for_dev".into(),
            status_display: "Ready for dev".into(),
            start_date: dt(2025, 12, 1),
            end_date: None,
        };
        let as_of = dt(2026, 1, 18);
        assert_eq!(entry.duration_as_of(as_of), as_of - dt(2025, 12, 1));
    }

    #[test]
    fn closed_interval_ignores_as_of() {
        let entry = StatusHistoryEntry {
            natural_id: "1".into(),
            status: "done".into(),
            status_display: "Done".into(),
            start_date: dt(2025, 1, 1),
            end_date: Some(dt(2025, 1, 5)),
        };
        assert_eq!(entry.duration_as_of(dt(2026, 1, 1)), dt(2025, 1, 5) - dt(2025, 1, 1));
    }
}
