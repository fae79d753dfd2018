//! Relational persistence layer.
//!
//! One trait ([`TrackerStorage`]), two backends: [`sqlite::SqliteStorage`]
//! (local/test) and [`postgres::PostgresStorage`] (production). Callers
//! depend on the trait, not the concrete backend, so the sync orchestrator
//! and metrics engine are backend-agnostic.

pub mod error;
pub mod postgres;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use postgres::{PostgresStorage, PostgresStorageConfig};
pub use sqlite::{SqliteStorage, SqliteStorageConfig};
pub use traits::{GroupBy, MetricType, RunOutcomeCounters, TrackerStorage};
