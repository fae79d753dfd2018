//! History reconstructor: pure transform from a changelog into a
//! sequence of `(status, start, end)` intervals, the last one open-ended.
//!
//! Deterministic and side-effect-free: given the same changelog, always
//! produces the same set of intervals. No I/O, no clock reads — the only time values
//! used are the ones carried in the input.

use chrono::{DateTime, Utc};
use tracing::warn;
use tracker_http::ChangeEvent;
use tracker_model::StatusHistoryEntry;

/// Outcome of one reconstruction pass: the interval sequence plus a count of
/// changelog events skipped for being malformed.
#[derive(Debug, Clone, Default)]
pub struct ReconstructionResult {
    pub entries: Vec<StatusHistoryEntry>,
    pub skipped_events: u32,
}

/// One status-change transition extracted from a changelog event.
struct StatusTransition {
    at: DateTime<Utc>,
    from_status: Option<String>,
    from_display: Option<String>,
    to_status: String,
    to_display: String,
}

/// Reconstructs the status-interval history for one task from its ordered
/// changelog.
///
/// `current_status`/`current_status_display` seed the initial interval when
/// the changelog carries no status-change events at all.
pub fn reconstruct(
    natural_id: &str,
    created_at: DateTime<Utc>,
    current_status: &str,
    current_status_display: &str,
    changelog: &[ChangeEvent],
) -> ReconstructionResult {
    let mut skipped_events = 0u32;
    let transitions = extract_transitions(changelog, &mut skipped_events);

    let mut entries = Vec::with_capacity(transitions.len() + 1);

    // Seed the initial interval: created_at as its start, and either
    // the first transition's `from_status` or the task's current status if
    // there are no status-change events at all.
    let (initial_status, initial_display) = match transitions.first() {
        Some(t) => (
            t.from_status.clone().unwrap_or_else(|| current_status.to_string()),
            t.from_display.clone().unwrap_or_else(|| current_status_display.to_string()),
        ),
        None => (current_status.to_string(), current_status_display.to_string()),
    };

    let mut open_status = initial_status;
    let mut open_display = initial_display;
    let mut open_start = created_at;

    for t in &transitions {
        // Close the currently open interval with end = event.timestamp and
        // open a new one with start = event.timestamp, status = to_status
        //. Zero-duration intervals (two events at the same instant)
        // are kept in storage — the bounce filter is metric-side only.
        entries.push(StatusHistoryEntry {
            natural_id: natural_id.to_string(),
            status: open_status,
            status_display: open_display,
            start_date: open_start,
            end_date: Some(t.at),
        });

        open_status = t.to_status.clone();
        open_display = t.to_display.clone();
        open_start = t.at;
    }

    // Final interval is open-ended.
    entries.push(StatusHistoryEntry {
        natural_id: natural_id.to_string(),
        status: open_status,
        status_display: open_display,
        start_date: open_start,
        end_date: None,
    });

    ReconstructionResult {
        entries,
        skipped_events,
    }
}

/// Extracts status transitions from changelog events in order, skipping
/// malformed ones (missing timestamp or missing `to_status`) with a warning.
fn extract_transitions(changelog: &[ChangeEvent], skipped_events: &mut u32) -> Vec<StatusTransition> {
    let mut transitions = Vec::new();

    for event in changelog {
        let Some(at) = event.updated_at else {
            warn!("skipping changelog event with missing timestamp");
            *skipped_events += 1;
            continue;
        };

        for field in &event.fields {
            if field.field != "status" {
                continue;
            }
            let Some(to) = &field.to_status else {
                warn!(%at, "skipping status field-change event with missing to_status");
                *skipped_events += 1;
                continue;
            };

            transitions.push(StatusTransition {
                at,
                from_status: field.from_status.as_ref().map(|s| s.key.clone()),
                from_display: field.from_status.as_ref().map(|s| s.display.clone()),
                to_status: to.key.clone(),
                to_display: to.display.clone(),
            });
        }
    }

    transitions
}
