//! Common error types shared between the worker and its collaborators.
//!
//! This module defines error types for queue, store, configuration, and
//! metrics operations.

use snafu::prelude::*;

// ============ Queue Errors ============

/// Errors that can occur during work queue operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// The queue backend could not be reached.
    #[snafu(display("Queue is unavailable: {message}"))]
    Unavailable { message: String },

    /// The queue has been closed and no longer accepts work.
    #[snafu(display("Queue has been closed"))]
    Closed,

    /// An ack/nack referenced a job that is not currently in flight.
    #[snafu(display("Job '{job_id}' is not in flight"))]
    NotInFlight { job_id: String },
}

// ============ Store Errors ============

/// Errors that can occur during job store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The store backend could not be reached.
    #[snafu(display("Store is unreachable: {message}"))]
    Unreachable { message: String },

    /// The store rejected a whole write batch.
    #[snafu(display("Bulk write rejected: {message}"))]
    WriteRejected { message: String },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Queue name is empty.
    #[snafu(display("Queue name cannot be empty"))]
    EmptyQueueName,

    /// Chunk size must be at least one.
    #[snafu(display("Chunk size must be greater than zero"))]
    ZeroChunkSize,

    /// Worker concurrency must be at least one.
    #[snafu(display("Worker concurrency must be greater than zero"))]
    ZeroConcurrency,

    /// Delivery attempts must be at least one.
    #[snafu(display("Max attempts must be greater than zero"))]
    ZeroAttempts,

    /// Rate limit window must admit at least one message.
    #[snafu(display("Rate limit must be greater than zero"))]
    ZeroRateLimit,

    /// Hard buffer cap below the chunk size would flush every item alone.
    #[snafu(display("Max buffer size {cap} is smaller than chunk size {chunk}"))]
    BufferCapTooSmall { cap: usize, chunk: usize },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },

    /// The metrics recorder was already installed.
    #[snafu(display("Metrics recorder already initialized"))]
    AlreadyInitialized,

    /// The metrics recorder has not been installed yet.
    #[snafu(display("Metrics recorder not initialized"))]
    NotInitialized,
}
