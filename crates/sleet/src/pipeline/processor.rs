//! Message consumption and the buffering/flush engine.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use sleet_common::emit;
use sleet_common::metrics::events::{
    BufferDepth, FlushCompleted, ItemProcessed, ItemStatus, ItemsDeadLettered, SummaryRecorded,
};
use sleet_common::queue::{DeadLetterStore, Delivery, WorkQueue};
use sleet_common::store::JobStore;
use sleet_common::types::{DeadLetterEntry, WorkItem};

use crate::buffer::{PushOutcome, SourceBuffers};
use crate::config::Config;
use crate::stats::RunStats;
use crate::writer::{BulkWriter, ChunkOutcome};

/// How a delivered payload was classified.
enum Classified {
    /// A usable work item.
    Item(WorkItem),
    /// Identity fields are missing or mistyped. Deterministically unusable,
    /// so the message is dropped without retry.
    Invalid(&'static str),
    /// The payload could not be decoded at all. Possibly upstream corruption,
    /// so the message goes through the retry path.
    Undecodable(String),
}

fn classify(payload: &Value) -> Classified {
    let Some(object) = payload.as_object() else {
        return Classified::Undecodable("payload is not a JSON object".to_string());
    };

    let has_str = |field: &str| {
        object
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    };
    if !has_str("source") {
        return Classified::Invalid("missing or non-string source");
    }
    if !has_str("guid") {
        return Classified::Invalid("missing or non-string guid");
    }

    match serde_json::from_value::<WorkItem>(payload.clone()) {
        Ok(item) => Classified::Item(item),
        Err(e) => Classified::Undecodable(format!("payload does not decode as a work item: {e}")),
    }
}

/// Owns the buffers and drives them: classifies deliveries, buffers valid
/// items, flushes on batch and hard-cap triggers, captures exhausted
/// messages, and persists run summaries when sources drain.
pub struct IngestProcessor {
    buffers: SourceBuffers,
    writer: BulkWriter,
    store: Arc<dyn JobStore>,
    dlq: Arc<dyn DeadLetterStore>,
    queue: Arc<dyn WorkQueue>,
    chunk_size: usize,
}

impl IngestProcessor {
    pub fn new(
        config: &Config,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn JobStore>,
        dlq: Arc<dyn DeadLetterStore>,
    ) -> Self {
        Self {
            buffers: SourceBuffers::new(config.worker.chunk_size, config.worker.max_buffer_size),
            writer: BulkWriter::new(Arc::clone(&store)),
            store,
            dlq,
            queue,
            chunk_size: config.worker.chunk_size,
        }
    }

    /// Handle one delivery to completion: every path ends in an ack or nack.
    pub async fn handle_delivery(&self, delivery: Delivery) {
        match classify(&delivery.payload) {
            Classified::Item(item) => {
                let source = item.source.clone();
                match self.buffers.push(item).await {
                    PushOutcome::Buffered { depth } => {
                        emit!(BufferDepth {
                            source: source.clone(),
                            depth,
                        });
                    }
                    PushOutcome::BatchReady { .. } => {
                        self.flush_source(&source).await;
                    }
                    PushOutcome::HardCap { drained } => {
                        warn!(
                            source = %source,
                            count = drained.len(),
                            "Buffer hard cap reached, forcing flush"
                        );
                        self.write_drained(&source, drained).await;
                    }
                }
                self.ack(&delivery.job_id).await;
                emit!(ItemProcessed {
                    status: ItemStatus::Buffered,
                });
            }
            Classified::Invalid(reason) => {
                warn!(job_id = %delivery.job_id, reason, "Dropping invalid work item");
                self.ack(&delivery.job_id).await;
                emit!(ItemProcessed {
                    status: ItemStatus::Invalid,
                });
            }
            Classified::Undecodable(reason) => {
                self.handle_failure(delivery, reason).await;
            }
        }
    }

    /// Retry or dead-letter a message whose processing failed. The capture
    /// threshold is the job's own retry policy, not a global one.
    async fn handle_failure(&self, delivery: Delivery, reason: String) {
        if delivery.attempts_made >= delivery.max_attempts {
            let entry = DeadLetterEntry::new(
                delivery.payload.clone(),
                reason.as_str(),
                delivery.attempts_made,
            );
            match self.dlq.push(entry).await {
                Ok(()) => {
                    warn!(
                        job_id = %delivery.job_id,
                        attempts = delivery.attempts_made,
                        reason = %reason,
                        "Message exhausted retries, captured to dead letter store"
                    );
                    self.ack(&delivery.job_id).await;
                    emit!(ItemsDeadLettered { count: 1 });
                    emit!(ItemProcessed {
                        status: ItemStatus::DeadLettered,
                    });
                }
                Err(e) => {
                    // Keep the message alive; capture will be retried on redelivery
                    error!(
                        job_id = %delivery.job_id,
                        error = %e,
                        "Failed to capture dead letter entry"
                    );
                    self.nack(&delivery.job_id).await;
                }
            }
        } else {
            debug!(
                job_id = %delivery.job_id,
                attempts = delivery.attempts_made,
                reason = %reason,
                "Processing failed, message will be retried"
            );
            self.nack(&delivery.job_id).await;
            emit!(ItemProcessed {
                status: ItemStatus::Retried,
            });
        }
    }

    /// Flush one source: drain FIFO chunks until the buffer is empty, then
    /// persist the run summary if the source fully drained.
    pub async fn flush_source(&self, source: &str) {
        if !self.buffers.try_begin_flush(source).await {
            return;
        }

        let started = Instant::now();
        let mut chunks = 0u64;
        while let Some(chunk) = self.buffers.take_chunk(source, self.chunk_size).await {
            let outcome = self.writer.write_chunk(source, &chunk).await;
            chunks += 1;
            let drained = self
                .buffers
                .complete_chunk(source, |stats| Self::merge_outcome(stats, &outcome))
                .await;
            self.record_summary(source, drained).await;
        }

        let drained = self.buffers.end_flush(source).await;
        self.record_summary(source, drained).await;

        // The gauge would otherwise stick at its pre-flush high-water mark
        let depth = self.buffers.depth(source).await;
        emit!(BufferDepth {
            source: source.to_string(),
            depth,
        });

        if chunks > 0 {
            emit!(FlushCompleted {
                source: source.to_string(),
                duration: started.elapsed(),
            });
            debug!(source = %source, chunks, "Flush pass complete");
        }
    }

    /// Flush every source that currently has a buffer.
    pub async fn flush_all(&self) {
        for source in self.buffers.sources().await {
            self.flush_source(&source).await;
        }
    }

    /// Items still sitting in buffers.
    pub async fn pending_items(&self) -> usize {
        self.buffers.total_depth().await
    }

    /// Write a hard-cap drain. The buffer already registered one in-flight
    /// write for the whole drain, so sub-chunk outcomes are combined and
    /// merged in a single step.
    async fn write_drained(&self, source: &str, items: Vec<WorkItem>) {
        let mut combined = ChunkOutcome::default();
        for chunk in items.chunks(self.chunk_size) {
            let outcome = self.writer.write_chunk(source, chunk).await;
            combined.inserted += outcome.inserted;
            combined.updated += outcome.updated;
            combined.failed += outcome.failed;
            if combined.error.is_none() {
                combined.error = outcome.error;
                combined.failed_keys = outcome.failed_keys;
            }
        }

        let drained = self
            .buffers
            .complete_chunk(source, |stats| Self::merge_outcome(stats, &combined))
            .await;
        self.record_summary(source, drained).await;

        let depth = self.buffers.depth(source).await;
        emit!(BufferDepth {
            source: source.to_string(),
            depth,
        });
    }

    fn merge_outcome(stats: &mut RunStats, outcome: &ChunkOutcome) {
        stats.record_written(outcome.inserted, outcome.updated);
        if outcome.failed > 0 {
            let error = outcome.error.as_deref().unwrap_or("bulk write failed");
            stats.record_failed(outcome.failed, error, outcome.failed_keys.clone());
        }
    }

    async fn record_summary(&self, source: &str, drained: Option<RunStats>) {
        let Some(stats) = drained else { return };
        let summary = stats.into_summary(source);
        let total_fetched = summary.total_fetched;
        let total_imported = summary.total_imported;
        match self.store.insert_run_summary(summary).await {
            Ok(()) => {
                emit!(SummaryRecorded {
                    source: source.to_string(),
                });
                info!(
                    source = %source,
                    total_fetched,
                    total_imported,
                    "Run summary recorded"
                );
            }
            Err(e) => {
                error!(source = %source, error = %e, "Failed to record run summary");
            }
        }
    }

    async fn ack(&self, job_id: &str) {
        if let Err(e) = self.queue.ack(job_id).await {
            error!(job_id = %job_id, error = %e, "Failed to ack message");
        }
    }

    async fn nack(&self, job_id: &str) {
        if let Err(e) = self.queue.nack(job_id).await {
            error!(job_id = %job_id, error = %e, "Failed to nack message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_accepts_a_complete_item() {
        let payload = json!({"source": "hn", "guid": "1", "title": "hello"});
        assert!(matches!(classify(&payload), Classified::Item(_)));
    }

    #[test]
    fn test_classify_flags_missing_identity_as_invalid() {
        assert!(matches!(
            classify(&json!({"guid": "1"})),
            Classified::Invalid(_)
        ));
        assert!(matches!(
            classify(&json!({"source": "hn", "guid": ""})),
            Classified::Invalid(_)
        ));
        assert!(matches!(
            classify(&json!({"source": 42, "guid": "1"})),
            Classified::Invalid(_)
        ));
    }

    #[test]
    fn test_classify_flags_non_objects_as_undecodable() {
        assert!(matches!(
            classify(&json!("just a string")),
            Classified::Undecodable(_)
        ));
        assert!(matches!(classify(&json!(null)), Classified::Undecodable(_)));
    }

    #[test]
    fn test_classify_flags_mistyped_fields_as_undecodable() {
        // Identity is fine but the rest of the payload does not decode
        let payload = json!({"source": "hn", "guid": "1", "title": {"nested": true}});
        assert!(matches!(classify(&payload), Classified::Undecodable(_)));
    }

    #[tokio::test]
    async fn test_buffer_depth_gauge_resets_after_drain() {
        use sleet_common::metrics::server::MetricsController;
        use sleet_common::queue::{MemoryDeadLetterStore, MemoryQueue};
        use sleet_common::store::MemoryStore;

        sleet_common::metrics::init_test();

        let mut config = Config::default();
        config.worker.chunk_size = 2;
        let processor = IngestProcessor::new(
            &config,
            Arc::new(MemoryQueue::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryDeadLetterStore::new()),
        );

        let delivery = |guid: &str| Delivery {
            job_id: format!("gauge-src#{guid}"),
            payload: json!({"source": "gauge-src", "guid": guid}),
            attempts_made: 1,
            max_attempts: 3,
        };

        // Second push reaches the chunk size and flushes the source empty
        processor.handle_delivery(delivery("1")).await;
        processor.handle_delivery(delivery("2")).await;

        let output = MetricsController::get().unwrap().render();
        assert!(output.contains(r#"sleet_buffer_depth{source="gauge-src"} 0"#));
    }
}
