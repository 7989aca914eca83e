//! Work queue and dead letter store boundaries.
//!
//! The worker talks to its queue only through these traits; the concrete
//! backend is an integration concern. `MemoryQueue` and
//! `MemoryDeadLetterStore` are the in-process implementations used by local
//! mode and tests.

mod memory;

pub use memory::{MemoryDeadLetterStore, MemoryQueue};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::QueueError;
use crate::types::DeadLetterEntry;

/// Default delivery attempts before a message is dead lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential redelivery backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// A job to enqueue: stable identity, payload, and retry policy.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_id: String,
    pub payload: serde_json::Value,
    pub max_attempts: u32,
    /// Base delay for exponential backoff between redeliveries.
    pub backoff_base: Duration,
}

impl JobSpec {
    pub fn new(job_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_id: job_id.into(),
            payload,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.backoff_base = backoff_base;
        self
    }
}

/// A message handed to a consumer. `attempts_made` counts this delivery;
/// `max_attempts` is the job's own retry policy, set at enqueue time.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job_id: String,
    pub payload: serde_json::Value,
    pub attempts_made: u32,
    pub max_attempts: u32,
}

/// The queue boundary.
///
/// Enqueueing a `job_id` that is already pending replaces its payload rather
/// than creating a duplicate; acked jobs are not retained, so the same id can
/// be enqueued again after completion.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a single job.
    async fn enqueue(&self, spec: JobSpec) -> Result<(), QueueError>;

    /// Enqueue a batch of jobs, returning the number accepted.
    async fn enqueue_bulk(&self, specs: Vec<JobSpec>) -> Result<usize, QueueError>;

    /// Wait for the next delivery. Returns `None` once the queue is closed.
    async fn next_delivery(&self) -> Option<Delivery>;

    /// Acknowledge a delivery; the job is done and will not be redelivered.
    async fn ack(&self, job_id: &str) -> Result<(), QueueError>;

    /// Reject a delivery; the job is redelivered after its backoff delay.
    async fn nack(&self, job_id: &str) -> Result<(), QueueError>;

    /// Number of jobs waiting for delivery (in-flight jobs excluded).
    async fn depth(&self) -> usize;

    /// Close the queue. Waiting consumers are released with `None`.
    async fn close(&self);
}

/// The dead letter boundary.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Persist an entry.
    async fn push(&self, entry: DeadLetterEntry) -> Result<(), QueueError>;

    /// List entries, oldest first. An empty result is not an error.
    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<DeadLetterEntry>, QueueError>;

    /// Fetch a single entry by id.
    async fn get(&self, id: &str) -> Result<Option<DeadLetterEntry>, QueueError>;

    /// Remove an entry. Returns false when the id was absent; that is a
    /// successful no-op, not an error.
    async fn remove(&self, id: &str) -> Result<bool, QueueError>;
}
