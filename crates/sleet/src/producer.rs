//! Queue producer: validates work items and submits them as queue jobs.
//!
//! Submission is idempotent end to end: each item's job id is derived from
//! its dedup key, so resubmitting an unconsumed item replaces its payload
//! rather than duplicating work.

use snafu::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sleet_common::emit;
use sleet_common::metrics::events::ItemsEnqueued;
use sleet_common::queue::{JobSpec, WorkQueue};
use sleet_common::types::WorkItem;

use crate::config::QueueConfig;
use crate::error::{InvalidItemSnafu, ProducerError, QueueUnavailableSnafu, SerializeSnafu};

/// Submission attempts against an unavailable queue.
const SUBMIT_ATTEMPTS: u32 = 3;

pub struct Producer {
    queue: Arc<dyn WorkQueue>,
    queue_name: String,
    max_attempts: u32,
    backoff_base: Duration,
}

impl Producer {
    pub fn new(queue: Arc<dyn WorkQueue>, config: &QueueConfig) -> Self {
        Self {
            queue,
            queue_name: config.name.clone(),
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base(),
        }
    }

    /// Submit a batch of work items, returning the number accepted.
    ///
    /// Every item is validated before anything is enqueued, so an invalid
    /// item rejects the batch without side effects. Transient queue failures
    /// are retried with exponential backoff before giving up.
    pub async fn submit(&self, items: Vec<WorkItem>) -> Result<usize, ProducerError> {
        let mut specs = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            ensure!(
                !item.source.is_empty(),
                InvalidItemSnafu {
                    index,
                    field: "source"
                }
            );
            ensure!(
                !item.guid.is_empty(),
                InvalidItemSnafu {
                    index,
                    field: "guid"
                }
            );

            let job_id = item.key().job_id();
            let payload = serde_json::to_value(&item).context(SerializeSnafu { index })?;
            specs.push(
                JobSpec::new(job_id, payload).with_retry(self.max_attempts, self.backoff_base),
            );
        }

        if specs.is_empty() {
            return Ok(0);
        }

        let mut delay = self.backoff_base;
        let mut attempt = 1;
        loop {
            match self.queue.enqueue_bulk(specs.clone()).await {
                Ok(accepted) => {
                    emit!(ItemsEnqueued {
                        count: accepted as u64,
                        queue: self.queue_name.clone(),
                    });
                    info!(queue = %self.queue_name, accepted, "Submitted work items");
                    return Ok(accepted);
                }
                Err(source) if attempt < SUBMIT_ATTEMPTS => {
                    warn!(
                        queue = %self.queue_name,
                        attempt,
                        error = %source,
                        "Queue submission failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(source) => {
                    return Err(source).context(QueueUnavailableSnafu { attempts: attempt });
                }
            }
        }
    }
}
