//! Error taxonomy for the persistence layer.

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sync run not found: {0}")]
    RunNotFound(uuid::Uuid),

    #[error("invalid row data: {0}")]
    InvalidRow(String),
}
