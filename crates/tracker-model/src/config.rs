//! Process-wide configuration.
//!
//! One struct per concern, loaded from environment variables with
//! documented fallbacks.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the sync engine and metrics engine.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub api_base_url: String,
    pub api_token: String,
    pub org_id: String,
    pub max_workers: usize,
    pub request_delay: Duration,
    pub scroll_page_size: u32,
    pub min_status_duration: Duration,
    pub lock_path: PathBuf,
    pub database_url: String,
    pub quarters_file: PathBuf,
    pub status_mapping_file: PathBuf,
    pub reports_dir: PathBuf,
}

/// A required environment variable was missing or empty.
///
/// Config errors are fatal before any work is done and never result in a
/// `SyncRunLog` row.
#[derive(Debug, thiserror::Error)]
#[error("missing or invalid configuration for {0}")]
pub struct ConfigError(pub &'static str);

impl TrackerConfig {
    /// Loads configuration from environment variables, applying documented
    /// defaults for everything except the values that have no safe default
    /// (API token, org id, database URL).
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base_url = std::env::var("TRACKER_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.tracker.yandex.net".to_string());
        let api_token =
            std::env::var("TRACKER_API_TOKEN").map_err(|_| ConfigError("TRACKER_API_TOKEN"))?;
        let org_id = std::env::var("TRACKER_ORG_ID").map_err(|_| ConfigError("TRACKER_ORG_ID"))?;
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError("DATABASE_URL"))?;

        let max_workers = env_parse_or("TRACKER_MAX_WORKERS", 10usize)?;
        let request_delay_ms = env_parse_or("TRACKER_REQUEST_DELAY_MS", 100u64)?;
        let scroll_page_size = env_parse_or("TRACKER_SCROLL_PAGE_SIZE", 100u32)?;
        let min_status_duration_secs = env_parse_or("TRACKER_MIN_STATUS_DURATION_SECS", 300u64)?;

        let lock_path = std::env::var("TRACKER_LOCK_PATH")
            .unwrap_or_else(|_| "/tmp/tracker-sync.lock".to_string())
            .into();
        let quarters_file = std::env::var("TRACKER_QUARTERS_FILE")
            .unwrap_or_else(|_| "quarters.toml".to_string())
            .into();
        let status_mapping_file = std::env::var("TRACKER_STATUS_MAPPING_FILE")
            .unwrap_or_else(|_| "status_mapping.toml".to_string())
            .into();
        let reports_dir = std::env::var("TRACKER_REPORTS_DIR")
            .unwrap_or_else(|_| "reports".to_string())
            .into();

        Ok(Self {
            api_base_url,
            api_token,
            org_id,
            max_workers,
            request_delay: Duration::from_millis(request_delay_ms),
            scroll_page_size,
            min_status_duration: Duration::from_secs(min_status_duration_secs),
            lock_path,
            database_url,
            quarters_file,
            status_mapping_file,
            reports_dir,
        })
    }
}

fn env_parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError(key)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_fails_without_required_vars() {
        for key in ["TRACKER_API_TOKEN", "TRACKER_ORG_ID", "DATABASE_URL"] {
            // SAFETY: test runs serially under `#[serial]`; no concurrent env mutation.
            unsafe { std::env::remove_var(key) };
        }
        assert!(TrackerConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn from_env_applies_defaults() {
        unsafe {
            std::env::set_var("TRACKER_API_TOKEN", "token");
            std::env::set_var("TRACKER_ORG_ID", "org");
            std::env::set_var("DATABASE_URL", "postgres://localhost/tracker");
            std::env::remove_var("TRACKER_MAX_WORKERS");
        }
        let config = TrackerConfig::from_env().unwrap();
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.scroll_page_size, 100);
    }
}
