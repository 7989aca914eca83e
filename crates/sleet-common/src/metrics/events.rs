//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the worker.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.
//!
//! Per-source metrics carry a `source` label so dashboards can break down
//! throughput and failures by feed. Queue-level metrics carry a `queue`
//! label instead.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when work items are accepted by the queue.
pub struct ItemsEnqueued {
    pub count: u64,
    pub queue: String,
}

impl InternalEvent for ItemsEnqueued {
    fn emit(self) {
        trace!(count = self.count, queue = %self.queue, "Items enqueued");
        counter!("sleet_items_enqueued_total", "queue" => self.queue).increment(self.count);
    }
}

/// Terminal status of a consumed message.
#[derive(Debug, Clone, Copy)]
pub enum ItemStatus {
    /// Valid item, added to a source buffer.
    Buffered,
    /// Unusable identity; dropped without retry.
    Invalid,
    /// Processing failed; handed back for redelivery.
    Retried,
    /// Attempts exhausted; captured to the dead letter store.
    DeadLettered,
}

impl ItemStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Buffered => "buffered",
            ItemStatus::Invalid => "invalid",
            ItemStatus::Retried => "retried",
            ItemStatus::DeadLettered => "dead_lettered",
        }
    }
}

/// Event emitted when a consumed message reaches a terminal handling status.
pub struct ItemProcessed {
    pub status: ItemStatus,
}

impl InternalEvent for ItemProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Item processed");
        counter!("sleet_items_processed_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Event emitted when a chunk write completes, successfully or not.
pub struct ChunkFlushed {
    pub source: String,
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
}

impl InternalEvent for ChunkFlushed {
    fn emit(self) {
        trace!(
            source = %self.source,
            inserted = self.inserted,
            updated = self.updated,
            failed = self.failed,
            "Chunk flushed"
        );
        counter!("sleet_jobs_inserted_total", "source" => self.source.clone())
            .increment(self.inserted);
        counter!("sleet_jobs_updated_total", "source" => self.source.clone())
            .increment(self.updated);
        counter!("sleet_jobs_failed_total", "source" => self.source).increment(self.failed);
    }
}

/// Event emitted when a full flush pass for a source completes.
pub struct FlushCompleted {
    pub source: String,
    pub duration: Duration,
}

impl InternalEvent for FlushCompleted {
    fn emit(self) {
        trace!(
            source = %self.source,
            duration_ms = self.duration.as_millis(),
            "Flush completed"
        );
        histogram!("sleet_flush_duration_seconds", "source" => self.source)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a source buffer's depth changes.
pub struct BufferDepth {
    pub source: String,
    pub depth: usize,
}

impl InternalEvent for BufferDepth {
    fn emit(self) {
        trace!(source = %self.source, depth = self.depth, "Buffer depth");
        gauge!("sleet_buffer_depth", "source" => self.source).set(self.depth as f64);
    }
}

/// Event emitted when messages are captured to the dead letter store.
pub struct ItemsDeadLettered {
    pub count: u64,
}

impl InternalEvent for ItemsDeadLettered {
    fn emit(self) {
        trace!(count = self.count, "Items dead lettered");
        counter!("sleet_dead_letters_total").increment(self.count);
    }
}

/// Event emitted when a dead letter entry is re-admitted to the queue.
pub struct DlqRequeued;

impl InternalEvent for DlqRequeued {
    fn emit(self) {
        trace!("Dead letter entry requeued");
        counter!("sleet_dlq_requeued_total").increment(1);
    }
}

/// Event emitted when a dead letter entry is removed.
pub struct DlqRemoved;

impl InternalEvent for DlqRemoved {
    fn emit(self) {
        trace!("Dead letter entry removed");
        counter!("sleet_dlq_removed_total").increment(1);
    }
}

/// Event emitted when a per-source run summary is persisted.
pub struct SummaryRecorded {
    pub source: String,
}

impl InternalEvent for SummaryRecorded {
    fn emit(self) {
        trace!(source = %self.source, "Run summary recorded");
        counter!("sleet_run_summaries_total", "source" => self.source).increment(1);
    }
}
