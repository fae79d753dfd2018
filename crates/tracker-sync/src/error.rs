//! Error taxonomy for the sync orchestrator.

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Another instance already holds the single-instance lock. Fatal; no `SyncRunLog` row is created.
    #[error("another sync instance already holds the lock")]
    LockContention,

    #[error("storage error: {0}")]
    Storage(#[from] tracker_storage::StorageError),

    /// The producer (scroll search) failed unrecoverably — no further task
    /// identifiers can be produced, so the run cannot meet its minimum
    /// guarantee even though individual task failures are otherwise
    /// tolerated.
    #[error("search scroll failed: {0}")]
    SearchFailed(#[from] tracker_http::HttpClientError),
}
