//! Sync orchestrator: single-instance lock, scroll producer, bounded
//! worker pool, per-task transactional writes, sync-run bookkeeping,
//! cooperative cancellation.

pub mod error;
pub mod lock;
pub mod mapping;
pub mod orchestrator;

pub use error::SyncError;
pub use lock::SingleInstanceLock;
pub use mapping::map_task;
pub use orchestrator::{RunOutcome, SyncInput, SyncOrchestrator, SyncResult};
