//! Error types for the sleet worker.

use snafu::prelude::*;

use sleet_common::error::{ConfigError, MetricsError, QueueError};

/// Errors that can occur when submitting work items to the queue.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProducerError {
    /// An item is missing part of its dedup identity.
    #[snafu(display("Work item at index {index} is missing {field}"))]
    InvalidItem { index: usize, field: &'static str },

    /// An item could not be serialized into a queue payload.
    #[snafu(display("Work item at index {index} could not be serialized"))]
    Serialize {
        index: usize,
        source: serde_json::Error,
    },

    /// The queue rejected the submission after all retries.
    #[snafu(display("Queue unavailable after {attempts} attempts: {source}"))]
    QueueUnavailable { attempts: u32, source: QueueError },
}

/// Errors that can occur during dead letter administration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DlqAdminError {
    /// The requested entry does not exist.
    #[snafu(display("Dead letter entry '{id}' not found"))]
    NotFound { id: String },

    /// The entry's payload cannot be turned back into a work item.
    #[snafu(display("Dead letter entry '{id}' has an unusable payload: {reason}"))]
    InvalidPayload { id: String, reason: String },

    /// The dead letter store failed.
    #[snafu(display("Dead letter store operation failed: {source}"))]
    DlqStore { source: QueueError },

    /// Re-admitting the entry to the work queue failed.
    #[snafu(display("Failed to re-admit entry to the work queue: {source}"))]
    Readmit { source: QueueError },
}

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration loading or validation failed.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// The metrics address is not a valid socket address.
    #[snafu(display("Invalid metrics address '{address}': {source}"))]
    MetricsAddress {
        address: String,
        source: std::net::AddrParseError,
    },

    /// Metrics initialization failed.
    #[snafu(display("Metrics initialization failed: {source}"))]
    Metrics { source: MetricsError },
}
