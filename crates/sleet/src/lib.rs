//! Sleet: feed ingestion worker.
//!
//! This crate handles:
//! - Producing dedup-keyed jobs onto the work queue
//! - Consuming deliveries into per-source buffers
//! - Flushing buffers as bulk idempotent upserts (interval, batch size, hard cap)
//! - Per-source run statistics, persisted when a source drains
//! - Dead letter capture and administration
//! - Rate-limited, cancellation-aware worker orchestration

pub mod buffer;
pub mod config;
pub mod dlq;
pub mod error;
pub mod pipeline;
pub mod producer;
pub mod rate;
pub mod stats;
pub mod writer;

// Re-export commonly used items
pub use config::Config;
pub use dlq::DlqAdmin;
pub use error::{DlqAdminError, PipelineError, ProducerError};
pub use pipeline::{run_pipeline, run_with_shutdown};
pub use producer::Producer;

// Re-export from sleet-common
pub use sleet_common::{MetricsConfig, shutdown_signal};

/// Initialize tracing with an env-filter, defaulting to `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
