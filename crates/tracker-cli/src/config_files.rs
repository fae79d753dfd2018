//! Loading of the TOML-backed domain config files: the
//! quarter bucket set and the status-name classification, both external to
//! process environment variables since they describe the tracker's own
//! workflow, not this process's runtime.

use std::path::Path;

use serde::Deserialize;
use tracker_model::{QuarterConfig, QuarterSet, StatusMapping};

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as TOML: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    InvalidQuarters(#[from] tracker_model::ModelError),
}

#[derive(Debug, Deserialize)]
struct QuartersFile {
    quarters: Vec<QuarterConfig>,
}

/// Loads and validates the quarter bucket set from a TOML file of the shape
/// `[[quarters]] name = "..." start_date = "YYYY-MM-DD" end_date = "YYYY-MM-DD"`.
/// An unparseable or invalid (overlapping) file is a fatal config error.
pub fn load_quarters(path: &Path) -> Result<QuarterSet, ConfigFileError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let parsed: QuartersFile = toml::from_str(&raw).map_err(|source| ConfigFileError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(QuarterSet::new(parsed.quarters)?)
}

/// Loads the status-name classification from a flat TOML file mirroring
/// [`StatusMapping`]'s field names directly.
pub fn load_status_mapping(path: &Path) -> Result<StatusMapping, ConfigFileError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigFileError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_quarters_parses_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[quarters]]
            name = "Q1-2026"
            start_date = "2026-01-01"
            end_date = "2026-03-31"

            [[quarters]]
            name = "Q2-2026"
            start_date = "2026-04-01"
            end_date = "2026-06-30"
            "#
        )
        .unwrap();

        let quarters = load_quarters(file.path()).unwrap();
        let bucket = quarters
            .bucket_for(chrono::NaiveDate::from_ymd_opt(2026, 5, 1).unwrap())
            .unwrap();
        assert_eq!(bucket.name, "Q2-2026");
    }

    #[test]
    fn load_quarters_rejects_overlap() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[quarters]]
            name = "Q1-2026"
            start_date = "2026-01-01"
            end_date = "2026-03-31"

            [[quarters]]
            name = "Q2-2026"
            start_date = "2026-03-15"
            end_date = "2026-06-30"
            "#
        )
        .unwrap();

        assert!(load_quarters(file.path()).is_err());
    }

    #[test]
    fn load_quarters_missing_file_is_an_error() {
        let err = load_quarters(Path::new("/nonexistent/quarters.toml"));
        assert!(matches!(err, Err(ConfigFileError::Read { .. })));
    }

    #[test]
    fn load_status_mapping_parses_flat_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            discovery_statuses = ["discovery"]
            done_statuses = ["closed", "resolved"]
            pause_statuses = ["waiting", "blocked"]
            external_test_statuses = ["external_test"]
            ready_for_dev_status = "ready_for_dev"
            in_work_status = "in_progress"
            testing_status = "testing"
            "#
        )
        .unwrap();

        let mapping = load_status_mapping(file.path()).unwrap();
        assert!(mapping.is_done("closed"));
        assert!(mapping.is_pause("blocked"));
        assert!(mapping.is_ready_for_dev("ready_for_dev"));
    }
}
