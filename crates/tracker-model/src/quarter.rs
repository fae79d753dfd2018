//! The `QuarterConfig` entity — externally provided buckets for grouping.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterConfig {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl QuarterConfig {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

/// An ordered, validated set of quarter buckets.
#[derive(Debug, Clone, Default)]
pub struct QuarterSet {
    quarters: Vec<QuarterConfig>,
}

impl QuarterSet {
    /// Validates that quarters are contiguous and non-overlapping once sorted
    /// by `start_date`.
    pub fn new(mut quarters: Vec<QuarterConfig>) -> Result<Self, ModelError> {
        quarters.sort_by_key(|q| q.start_date);
        for pair in quarters.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.end_date >= b.start_date {
                return Err(ModelError::InvalidQuarterConfig(format!(
                    "quarter {} ({} .. {}) overlaps {} ({} .. {})",
                    a.name, a.start_date, a.end_date, b.name, b.start_date, b.end_date
                )));
            }
        }
        Ok(Self { quarters })
    }

    /// Finds the quarter whose `[start, end]` contains `date`, if any.
    pub fn bucket_for(&self, date: NaiveDate) -> Option<&QuarterConfig> {
        self.quarters.iter().find(|q| q.contains(date))
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuarterConfig> {
        self.quarters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(name: &str, s: (i32, u32, u32), e: (i32, u32, u32)) -> QuarterConfig {
        QuarterConfig {
            name: name.into(),
            start_date: NaiveDate::from_ymd_opt(s.0, s.1, s.2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(e.0, e.1, e.2).unwrap(),
        }
    }

    #[test]
    fn rejects_overlapping_quarters() {
        let quarters = vec![
            q("Q1", (2025, 1, 1), (2025, 3, 31)),
            q("Q2", (2025, 3, 15), (2025, 6, 30)),
        ];
        assert!(QuarterSet::new(quarters).is_err());
    }

    #[test]
    fn finds_bucket_for_date() {
        let quarters = vec![
            q("Q1", (2025, 1, 1), (2025, 3, 31)),
            q("Q2", (2025, 4, 1), (2025, 6, 30)),
        ];
        let set = QuarterSet::new(quarters).unwrap();
        let bucket = set
            .bucket_for(NaiveDate::from_ymd_opt(2025, 5, 15).unwrap())
            .unwrap();
        assert_eq!(bucket.name, "Q2");
    }
}
