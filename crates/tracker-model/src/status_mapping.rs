//! The `StatusMapping` entity — externally provided classification of statuses.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Classification of the tracker's status names into the sets the metrics
/// engine reasons about.
///
/// Sets are pairwise disjoint except where documented (a status may
/// legitimately be both `ready_for_dev_status` and absent from every other
/// set, for instance).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusMapping {
    pub discovery_statuses: HashSet<String>,
    pub done_statuses: HashSet<String>,
    pub pause_statuses: HashSet<String>,
    pub external_test_statuses: HashSet<String>,
    pub ready_for_dev_status: String,
    pub in_work_status: String,
    pub testing_status: String,
}

impl StatusMapping {
    pub fn is_pause(&self, status: &str) -> bool {
        self.pause_statuses.contains(status)
    }

    pub fn is_done(&self, status: &str) -> bool {
        self.done_statuses.contains(status)
    }

    pub fn is_discovery(&self, status: &str) -> bool {
        self.discovery_statuses.contains(status)
    }

    pub fn is_external_test(&self, status: &str) -> bool {
        self.external_test_statuses.contains(status)
    }

    pub fn is_ready_for_dev(&self, status: &str) -> bool {
        status == self.ready_for_dev_status
    }

    pub fn is_in_work(&self, status: &str) -> bool {
        status == self.in_work_status
    }

    pub fn is_testing(&self, status: &str) -> bool {
        status == self.testing_status
    }
}
