//! In-process queue and dead letter store.
//!
//! `MemoryQueue` models the broker semantics the worker relies on: idempotent
//! enqueue by job id, per-delivery attempt counting, and backoff-delayed
//! redelivery on nack. It backs local mode and every test that drives the
//! pipeline end to end.

use async_trait::async_trait;
use snafu::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::error::{ClosedSnafu, NotInFlightSnafu, QueueError};
use crate::types::DeadLetterEntry;

use super::{DeadLetterStore, Delivery, JobSpec, WorkQueue};

/// Ceiling on the exponential redelivery delay.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

struct JobState {
    spec: JobSpec,
    attempts_made: u32,
    in_flight: bool,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<String>,
    jobs: HashMap<String, JobState>,
    closed: bool,
}

/// In-process work queue.
pub struct MemoryQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    fn admit(state: &mut QueueState, spec: JobSpec) {
        match state.jobs.entry(spec.job_id.clone()) {
            Entry::Occupied(mut occupied) => {
                // Same id already known: replace the payload in place
                occupied.get_mut().spec = spec;
            }
            Entry::Vacant(vacant) => {
                state.pending.push_back(spec.job_id.clone());
                vacant.insert(JobState {
                    spec,
                    attempts_made: 0,
                    in_flight: false,
                });
            }
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, spec: JobSpec) -> Result<(), QueueError> {
        {
            let mut guard = self.state.lock().await;
            ensure!(!guard.closed, ClosedSnafu);
            Self::admit(&mut guard, spec);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn enqueue_bulk(&self, specs: Vec<JobSpec>) -> Result<usize, QueueError> {
        let accepted = {
            let mut guard = self.state.lock().await;
            ensure!(!guard.closed, ClosedSnafu);
            let count = specs.len();
            for spec in specs {
                Self::admit(&mut guard, spec);
            }
            count
        };
        for _ in 0..accepted {
            self.notify.notify_one();
        }
        Ok(accepted)
    }

    async fn next_delivery(&self) -> Option<Delivery> {
        loop {
            // Register interest before checking state so an enqueue racing
            // with the check cannot be missed
            let notified = self.notify.notified();
            tokio::pin!(notified);

            {
                let mut guard = self.state.lock().await;
                let state = &mut *guard;
                if state.closed {
                    return None;
                }
                while let Some(job_id) = state.pending.pop_front() {
                    if let Some(job) = state.jobs.get_mut(&job_id) {
                        job.in_flight = true;
                        job.attempts_made += 1;
                        return Some(Delivery {
                            payload: job.spec.payload.clone(),
                            attempts_made: job.attempts_made,
                            max_attempts: job.spec.max_attempts,
                            job_id,
                        });
                    }
                    // Stale id left behind by an ack; keep scanning
                }
            }

            notified.await;
        }
    }

    async fn ack(&self, job_id: &str) -> Result<(), QueueError> {
        let mut guard = self.state.lock().await;
        ensure!(guard.jobs.remove(job_id).is_some(), NotInFlightSnafu { job_id });
        guard.pending.retain(|id| id != job_id);
        Ok(())
    }

    async fn nack(&self, job_id: &str) -> Result<(), QueueError> {
        let delay = {
            let mut guard = self.state.lock().await;
            let job = guard
                .jobs
                .get_mut(job_id)
                .context(NotInFlightSnafu { job_id })?;
            job.in_flight = false;
            let exponent = job.attempts_made.saturating_sub(1).min(16);
            job.spec
                .backoff_base
                .saturating_mul(1 << exponent)
                .min(MAX_BACKOFF)
        };

        debug!(job_id = %job_id, delay_ms = delay.as_millis() as u64, "Scheduling redelivery");

        let state = Arc::clone(&self.state);
        let notify = Arc::clone(&self.notify);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let requeued = {
                let mut guard = state.lock().await;
                let state = &mut *guard;
                let eligible = !state.closed
                    && state.jobs.get(&job_id).is_some_and(|job| !job.in_flight)
                    && !state.pending.contains(&job_id);
                if eligible {
                    state.pending.push_back(job_id);
                }
                eligible
            };
            if requeued {
                notify.notify_one();
            }
        });

        Ok(())
    }

    async fn depth(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }
}

/// In-process dead letter store.
#[derive(Default)]
pub struct MemoryDeadLetterStore {
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl MemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn push(&self, entry: DeadLetterEntry) -> Result<(), QueueError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<DeadLetterEntry>, QueueError> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<DeadLetterEntry>, QueueError> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }

    async fn remove(&self, id: &str) -> Result<bool, QueueError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_enqueue_same_id_replaces_payload() {
        let queue = MemoryQueue::new();
        queue
            .enqueue(JobSpec::new("a#1", json!({"v": 1})))
            .await
            .unwrap();
        queue
            .enqueue(JobSpec::new("a#1", json!({"v": 2})))
            .await
            .unwrap();

        assert_eq!(queue.depth().await, 1);
        let delivery = queue.next_delivery().await.unwrap();
        assert_eq!(delivery.payload, json!({"v": 2}));
        assert_eq!(delivery.attempts_made, 1);
    }

    #[tokio::test]
    async fn test_ack_releases_id_for_reuse() {
        let queue = MemoryQueue::new();
        queue
            .enqueue(JobSpec::new("a#1", json!({"v": 1})))
            .await
            .unwrap();
        let delivery = queue.next_delivery().await.unwrap();
        queue.ack(&delivery.job_id).await.unwrap();

        // Second ack is an error; the job is gone
        assert!(queue.ack(&delivery.job_id).await.is_err());

        queue
            .enqueue(JobSpec::new("a#1", json!({"v": 2})))
            .await
            .unwrap();
        let delivery = queue.next_delivery().await.unwrap();
        assert_eq!(delivery.attempts_made, 1);
    }

    #[tokio::test]
    async fn test_nack_redelivers_with_incremented_attempts() {
        let queue = MemoryQueue::new();
        let spec =
            JobSpec::new("a#1", json!({"v": 1})).with_retry(5, Duration::from_millis(1));
        queue.enqueue(spec).await.unwrap();

        let first = queue.next_delivery().await.unwrap();
        assert_eq!(first.attempts_made, 1);
        queue.nack(&first.job_id).await.unwrap();

        let second = queue.next_delivery().await.unwrap();
        assert_eq!(second.attempts_made, 2);
        // Deliveries carry the job's own retry policy
        assert_eq!(second.max_attempts, 5);
    }

    #[tokio::test]
    async fn test_close_releases_waiting_consumer() {
        let queue = Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next_delivery().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await;

        assert!(consumer.await.unwrap().is_none());
        assert!(queue.enqueue(JobSpec::new("a#1", json!({}))).await.is_err());
    }

    #[tokio::test]
    async fn test_dead_letter_store_roundtrip() {
        let store = MemoryDeadLetterStore::new();
        let entry = DeadLetterEntry::new(json!({"broken": true}), "boom", 3);
        let id = entry.id.clone();
        store.push(entry).await.unwrap();

        assert_eq!(store.list(10, 0).await.unwrap().len(), 1);
        assert!(store.get(&id).await.unwrap().is_some());

        assert!(store.remove(&id).await.unwrap());
        // Removing an absent id is a no-op, not an error
        assert!(!store.remove(&id).await.unwrap());
    }
}
