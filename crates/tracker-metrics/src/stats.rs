//! Summary statistics for the aggregated-by-quarter view.
//!
//! Mean and 85th-percentile (nearest-rank) over a metric's values within one
//! `(quarter, group)` cell. The pause mean/P85 must be computed from the
//! exact same `pause_up_to(h, anchor_end)` series used to deduct the paired
//! delivery metric — callers are responsible for passing the
//! matching pause series alongside the metric series; this module only does
//! the arithmetic.

/// Arithmetic mean, or `None` for an empty series.
pub fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}

/// Nearest-rank 85th percentile, or `None` for an empty series.
///
/// Nearest-rank: sort ascending, rank = `ceil(p/100 * n)` clamped to `[1, n]`,
/// return the value at that rank (1-indexed).
pub fn percentile_85(values: &[i64]) -> Option<i64> {
    percentile(values, 85)
}

fn percentile(values: &[i64], p: u32) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let n = sorted.len() as f64;
    let rank = ((p as f64 / 100.0) * n).ceil() as usize;
    let rank = rank.clamp(1, sorted.len());
    Some(sorted[rank - 1])
}
