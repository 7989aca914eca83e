//! Shared infrastructure for the sleet ingestion worker.
//!
//! This crate holds everything that is not worker policy:
//! - Data types for work items, run summaries, and dead letter entries
//! - The `WorkQueue`, `JobStore`, and `DeadLetterStore` trait boundaries,
//!   plus in-process reference implementations used by tests and local mode
//! - Error types, metrics plumbing, config interpolation, signal handling

pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod signal;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use config::{InterpolationResult, MetricsConfig, interpolate};
pub use error::{ConfigError, MetricsError, QueueError, StoreError};
pub use queue::{
    DeadLetterStore, Delivery, JobSpec, MemoryDeadLetterStore, MemoryQueue, WorkQueue,
};
pub use signal::shutdown_signal;
pub use store::{JobStore, MemoryStore, SummaryFilter, UpsertReport};
pub use types::{DeadLetterEntry, FailureSample, ItemKey, RunSummary, StoredJob, WorkItem};
