//! Error taxonomy for the metrics engine.

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("storage error: {0}")]
    Storage(#[from] tracker_storage::StorageError),

    #[error("failed to write report: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to open report file: {0}")]
    Io(#[from] std::io::Error),
}
