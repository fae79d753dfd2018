//! HTTP client for the remote issue tracker.
//!
//! Typed calls against the remote tracker REST API: scroll-paginated search,
//! single/batch task fetch, and changelog fetch. Owns the rate-limit gate and
//! retry/backoff policy so every other crate in the workspace talks to the
//! network only through [`TrackerHttpClient`].

pub mod client;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod wire;

pub use client::{TrackerHttpClient, MAX_BATCH_SIZE};
pub use error::HttpClientError;
pub use rate_limit::RateLimiter;
pub use retry::RetryConfig;
pub use wire::{ChangeEvent, FieldChange, RemoteTask, StatusValue};
