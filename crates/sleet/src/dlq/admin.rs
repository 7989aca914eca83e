//! Administrative operations over the dead letter store.

use snafu::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use sleet_common::emit;
use sleet_common::metrics::events::{DlqRemoved, DlqRequeued};
use sleet_common::queue::{DeadLetterStore, JobSpec, WorkQueue};
use sleet_common::types::{DeadLetterEntry, WorkItem};

use crate::config::QueueConfig;
use crate::error::{DlqAdminError, DlqStoreSnafu, InvalidPayloadSnafu, NotFoundSnafu, ReadmitSnafu};

pub struct DlqAdmin {
    dlq: Arc<dyn DeadLetterStore>,
    queue: Arc<dyn WorkQueue>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl DlqAdmin {
    pub fn new(
        dlq: Arc<dyn DeadLetterStore>,
        queue: Arc<dyn WorkQueue>,
        config: &QueueConfig,
    ) -> Self {
        Self {
            dlq,
            queue,
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base(),
        }
    }

    /// List dead letter entries, oldest first.
    pub async fn list(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DeadLetterEntry>, DlqAdminError> {
        self.dlq.list(limit, offset).await.context(DlqStoreSnafu)
    }

    /// Re-admit a dead letter entry to the work queue, then remove it.
    ///
    /// The job is enqueued under the deterministic identity
    /// `requeue:{source}#{guid}`, so requeueing the same entry twice replaces
    /// the pending job instead of duplicating it, and the id cannot collide
    /// with a still-pending original. Entry removal is the final step; a
    /// failure before it leaves the entry requeueable rather than lost.
    pub async fn requeue(&self, id: &str) -> Result<(), DlqAdminError> {
        let entry = self
            .dlq
            .get(id)
            .await
            .context(DlqStoreSnafu)?
            .context(NotFoundSnafu { id })?;

        let item: WorkItem = match serde_json::from_value(entry.payload.clone()) {
            Ok(item) => item,
            Err(e) => {
                return InvalidPayloadSnafu {
                    id,
                    reason: e.to_string(),
                }
                .fail();
            }
        };
        ensure!(
            item.has_identity(),
            InvalidPayloadSnafu {
                id,
                reason: "missing source or guid",
            }
        );

        let job_id = format!("requeue:{}", item.key().job_id());
        let spec = JobSpec::new(job_id.clone(), entry.payload.clone())
            .with_retry(self.max_attempts, self.backoff_base);
        self.queue.enqueue(spec).await.context(ReadmitSnafu)?;

        self.dlq.remove(id).await.context(DlqStoreSnafu)?;

        emit!(DlqRequeued);
        info!(entry = %id, job_id = %job_id, "Dead letter entry requeued");
        Ok(())
    }

    /// Remove an entry. Removing an absent id is a successful no-op.
    pub async fn remove(&self, id: &str) -> Result<bool, DlqAdminError> {
        let removed = self.dlq.remove(id).await.context(DlqStoreSnafu)?;
        if removed {
            emit!(DlqRemoved);
            info!(entry = %id, "Dead letter entry removed");
        } else {
            warn!(entry = %id, "Dead letter entry not found; nothing removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sleet_common::queue::{MemoryDeadLetterStore, MemoryQueue};

    fn admin() -> (Arc<MemoryDeadLetterStore>, Arc<MemoryQueue>, DlqAdmin) {
        let dlq = Arc::new(MemoryDeadLetterStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let admin = DlqAdmin::new(dlq.clone(), queue.clone(), &QueueConfig::default());
        (dlq, queue, admin)
    }

    #[tokio::test]
    async fn test_requeue_readmits_then_removes() {
        let (dlq, queue, admin) = admin();
        let entry = DeadLetterEntry::new(json!({"source": "hn", "guid": "1"}), "boom", 3);
        let id = entry.id.clone();
        dlq.push(entry).await.unwrap();

        admin.requeue(&id).await.unwrap();

        assert_eq!(queue.depth().await, 1);
        let delivery = queue.next_delivery().await.unwrap();
        assert_eq!(delivery.job_id, "requeue:hn#1");
        assert_eq!(delivery.payload, json!({"source": "hn", "guid": "1"}));

        // Entry is gone; a second requeue reports NotFound
        let err = admin.requeue(&id).await.unwrap_err();
        assert!(matches!(err, DlqAdminError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_requeue_rejects_unusable_payload_and_keeps_entry() {
        let (dlq, queue, admin) = admin();
        let entry = DeadLetterEntry::new(json!("not an object"), "boom", 3);
        let id = entry.id.clone();
        dlq.push(entry).await.unwrap();

        let err = admin.requeue(&id).await.unwrap_err();
        assert!(matches!(err, DlqAdminError::InvalidPayload { .. }));

        // Nothing was enqueued and the entry survives for inspection
        assert_eq!(queue.depth().await, 0);
        assert!(dlq.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_requeue_rejects_payload_without_identity() {
        let (dlq, _queue, admin) = admin();
        let entry = DeadLetterEntry::new(json!({"source": "hn"}), "boom", 3);
        let id = entry.id.clone();
        dlq.push(entry).await.unwrap();

        let err = admin.requeue(&id).await.unwrap_err();
        assert!(matches!(err, DlqAdminError::InvalidPayload { .. }));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (dlq, _queue, admin) = admin();
        let entry = DeadLetterEntry::new(json!({"source": "hn", "guid": "1"}), "boom", 3);
        let id = entry.id.clone();
        dlq.push(entry).await.unwrap();

        assert!(admin.remove(&id).await.unwrap());
        // Absent id: success, no error
        assert!(!admin.remove(&id).await.unwrap());
        assert!(!admin.remove("never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_pages_entries() {
        let (dlq, _queue, admin) = admin();
        for i in 0..5 {
            dlq.push(DeadLetterEntry::new(
                json!({"source": "hn", "guid": i.to_string()}),
                "boom",
                3,
            ))
            .await
            .unwrap();
        }

        assert_eq!(admin.list(2, 0).await.unwrap().len(), 2);
        assert_eq!(admin.list(10, 4).await.unwrap().len(), 1);
        assert!(admin.list(10, 9).await.unwrap().is_empty());
    }
}
