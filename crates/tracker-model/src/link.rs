//! Task link graph types, used by the hierarchy resolver.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Direction of a link relative to the task that declares it.
///
/// The remote tracker reports links from the perspective of the task that
/// owns the JSON array; "inward" means the linked task is the one pointed at
/// by a subtask/parent-style relationship, matching the configured
/// `link_direction` in the hierarchy resolver contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Inward,
    Outward,
}

impl std::str::FromStr for LinkDirection {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inward" => Ok(LinkDirection::Inward),
            "outward" => Ok(LinkDirection::Outward),
            other => Err(ModelError::InvalidLinkDirection(other.to_string())),
        }
    }
}

/// One entry in a task's `links` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLink {
    pub link_type_id: String,
    pub direction: LinkDirection,
    pub target_key: String,
}
