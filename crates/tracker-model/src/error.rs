//! Errors that can arise while parsing or validating domain data.

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("invalid link direction: {0}")]
    InvalidLinkDirection(String),

    #[error("invalid sync run status: {0}")]
    InvalidRunStatus(String),

    #[error("quarter config is malformed: {0}")]
    InvalidQuarterConfig(String),
}
