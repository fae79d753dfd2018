//! Configuration for the hierarchy resolver.
//!
//! Separate from [`crate::config::TrackerConfig`] because it is domain
//! config (queue/link-type conventions) loaded from its own env vars, not
//! process config.

use crate::config::ConfigError;
use crate::link::LinkDirection;

/// The link-graph convention used to find a root task's downstream closure.
#[derive(Debug, Clone)]
pub struct HierarchyConfig {
    /// Queue prefix (e.g. `"DOWN"`) that downstream tasks must belong to.
    pub downstream_queue_prefix: String,
    /// Link-type id that denotes the "subtask" relationship to follow.
    pub link_type_id: String,
    /// Direction of that link relative to the task declaring it.
    pub direction: LinkDirection,
    /// Depth bound to guarantee termination in the presence of cycles.
    pub max_depth: u32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            downstream_queue_prefix: "DOWN".to_string(),
            link_type_id: "subtask".to_string(),
            direction: LinkDirection::Inward,
            max_depth: 10,
        }
    }
}

impl HierarchyConfig {
    /// Loads the hierarchy convention from environment variables, falling
    /// back to [`HierarchyConfig::default`] field by field so a deployment
    /// only needs to override what differs from the common case.
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        let downstream_queue_prefix = std::env::var("TRACKER_HIERARCHY_DOWNSTREAM_QUEUE_PREFIX")
            .unwrap_or(default.downstream_queue_prefix);
        let link_type_id =
            std::env::var("TRACKER_HIERARCHY_LINK_TYPE_ID").unwrap_or(default.link_type_id);
        let direction = match std::env::var("TRACKER_HIERARCHY_DIRECTION") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError("TRACKER_HIERARCHY_DIRECTION"))?,
            Err(_) => default.direction,
        };
        let max_depth = match std::env::var("TRACKER_HIERARCHY_MAX_DEPTH") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError("TRACKER_HIERARCHY_MAX_DEPTH"))?,
            Err(_) => default.max_depth,
        };

        Ok(Self {
            downstream_queue_prefix,
            link_type_id,
            direction,
            max_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_applies_defaults_when_unset() {
        unsafe {
            std::env::remove_var("TRACKER_HIERARCHY_DOWNSTREAM_QUEUE_PREFIX");
            std::env::remove_var("TRACKER_HIERARCHY_LINK_TYPE_ID");
            std::env::remove_var("TRACKER_HIERARCHY_DIRECTION");
            std::env::remove_var("TRACKER_HIERARCHY_MAX_DEPTH");
        }
        let config = HierarchyConfig::from_env().unwrap();
        let default = HierarchyConfig::default();
        assert_eq!(config.downstream_queue_prefix, default.downstream_queue_prefix);
        assert_eq!(config.link_type_id, default.link_type_id);
        assert_eq!(config.max_depth, default.max_depth);
    }

    #[test]
    #[serial]
    fn from_env_overrides_link_type_and_depth() {
        unsafe {
            std::env::set_var("TRACKER_HIERARCHY_LINK_TYPE_ID", "relates");
            std::env::set_var("TRACKER_HIERARCHY_MAX_DEPTH", "3");
            std::env::set_var("TRACKER_HIERARCHY_DIRECTION", "outward");
        }
        let config = HierarchyConfig::from_env().unwrap();
        assert_eq!(config.link_type_id, "relates");
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.direction, LinkDirection::Outward);
        unsafe {
            std::env::remove_var("TRACKER_HIERARCHY_LINK_TYPE_ID");
            std::env::remove_var("TRACKER_HIERARCHY_MAX_DEPTH");
            std::env::remove_var("TRACKER_HIERARCHY_DIRECTION");
        }
    }
}
