//! Per-source buffering with batch and hard-cap flush triggers.
//!
//! Buffers live in a per-source arena: an outer map lock held only for slot
//! lookup, creation, and removal, and one inner lock per source slot. A
//! `flushing` flag per slot keeps flush passes exclusive while still letting
//! handlers append during a flush. Writes in progress are tracked so a slot
//! is only drained, and its summary persisted, after the last outstanding
//! chunk has been merged.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use sleet_common::types::WorkItem;

use crate::stats::RunStats;

/// Outcome of buffering a single item.
#[derive(Debug)]
pub enum PushOutcome {
    /// Item buffered below the batch threshold.
    Buffered { depth: usize },
    /// Buffer reached the chunk size; the caller should flush this source.
    BatchReady { depth: usize },
    /// Buffer hit the hard cap. The previous contents were drained before the
    /// overflowing item was appended and must be written by the caller, who
    /// then owes a matching `complete_chunk` call.
    HardCap { drained: Vec<WorkItem> },
}

#[derive(Default)]
struct SourceSlot {
    items: Vec<WorkItem>,
    stats: RunStats,
    flushing: bool,
    inflight_writes: usize,
    /// Set when the slot has been drained out of the arena; a handler holding
    /// a stale reference must not append to it.
    retired: bool,
}

impl SourceSlot {
    fn drainable(&self) -> bool {
        self.items.is_empty() && !self.flushing && self.inflight_writes == 0
    }
}

pub struct SourceBuffers {
    slots: Mutex<HashMap<String, Arc<Mutex<SourceSlot>>>>,
    chunk_size: usize,
    hard_cap: usize,
}

impl SourceBuffers {
    pub fn new(chunk_size: usize, hard_cap: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            chunk_size,
            hard_cap,
        }
    }

    async fn slot(&self, source: &str) -> Arc<Mutex<SourceSlot>> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(source.to_string()).or_default())
    }

    async fn existing_slot(&self, source: &str) -> Option<Arc<Mutex<SourceSlot>>> {
        self.slots.lock().await.get(source).cloned()
    }

    /// Buffer one item for its source, counting it as fetched.
    pub async fn push(&self, item: WorkItem) -> PushOutcome {
        loop {
            let slot = self.slot(&item.source).await;
            let mut slot = slot.lock().await;
            if slot.retired {
                // Drained between lookup and lock; take a fresh slot
                continue;
            }

            slot.stats.record_fetched();

            if slot.items.len() >= self.hard_cap {
                let drained = std::mem::take(&mut slot.items);
                slot.items.push(item);
                slot.inflight_writes += 1;
                return PushOutcome::HardCap { drained };
            }

            slot.items.push(item);
            let depth = slot.items.len();
            return if depth >= self.chunk_size {
                PushOutcome::BatchReady { depth }
            } else {
                PushOutcome::Buffered { depth }
            };
        }
    }

    /// Claim the flush for a source. Returns false when another flush is
    /// already running or the source has no buffer.
    pub async fn try_begin_flush(&self, source: &str) -> bool {
        let Some(slot) = self.existing_slot(source).await else {
            return false;
        };
        let mut slot = slot.lock().await;
        if slot.flushing || slot.retired {
            return false;
        }
        slot.flushing = true;
        true
    }

    /// Take the next FIFO chunk for a source, registering an in-flight write.
    /// Every `Some` return owes a matching `complete_chunk` call.
    pub async fn take_chunk(&self, source: &str, max: usize) -> Option<Vec<WorkItem>> {
        let slot = self.existing_slot(source).await?;
        let mut slot = slot.lock().await;
        if slot.items.is_empty() {
            return None;
        }
        let take = slot.items.len().min(max);
        let chunk: Vec<WorkItem> = slot.items.drain(..take).collect();
        slot.inflight_writes += 1;
        Some(chunk)
    }

    /// Merge a completed write into the source's stats. Returns the drained
    /// stats when this was the last outstanding work for the source.
    pub async fn complete_chunk<F>(&self, source: &str, merge: F) -> Option<RunStats>
    where
        F: FnOnce(&mut RunStats),
    {
        let mut slots = self.slots.lock().await;
        let slot_arc = Arc::clone(slots.get(source)?);
        let mut slot = slot_arc.lock().await;
        merge(&mut slot.stats);
        slot.inflight_writes = slot.inflight_writes.saturating_sub(1);
        if slot.drainable() {
            let stats = std::mem::take(&mut slot.stats);
            slot.retired = true;
            drop(slot);
            slots.remove(source);
            Some(stats)
        } else {
            None
        }
    }

    /// Release the flush claim. Returns the drained stats when the source is
    /// empty with no writes outstanding.
    pub async fn end_flush(&self, source: &str) -> Option<RunStats> {
        let mut slots = self.slots.lock().await;
        let slot_arc = Arc::clone(slots.get(source)?);
        let mut slot = slot_arc.lock().await;
        slot.flushing = false;
        if slot.drainable() {
            let stats = std::mem::take(&mut slot.stats);
            slot.retired = true;
            drop(slot);
            slots.remove(source);
            Some(stats)
        } else {
            None
        }
    }

    /// Sources that currently have a buffer slot.
    pub async fn sources(&self) -> Vec<String> {
        self.slots.lock().await.keys().cloned().collect()
    }

    /// Buffered item count for one source.
    pub async fn depth(&self, source: &str) -> usize {
        match self.existing_slot(source).await {
            Some(slot) => slot.lock().await.items.len(),
            None => 0,
        }
    }

    /// Buffered item count across all sources.
    pub async fn total_depth(&self) -> usize {
        let slots: Vec<_> = {
            self.slots.lock().await.values().cloned().collect()
        };
        let mut total = 0;
        for slot in slots {
            total += slot.lock().await.items.len();
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(source: &str, guid: usize) -> WorkItem {
        WorkItem::new(source, format!("guid-{guid}"))
    }

    #[tokio::test]
    async fn test_batch_ready_at_chunk_size() {
        let buffers = SourceBuffers::new(3, 100);

        assert!(matches!(
            buffers.push(item("hn", 0)).await,
            PushOutcome::Buffered { depth: 1 }
        ));
        assert!(matches!(
            buffers.push(item("hn", 1)).await,
            PushOutcome::Buffered { depth: 2 }
        ));
        assert!(matches!(
            buffers.push(item("hn", 2)).await,
            PushOutcome::BatchReady { depth: 3 }
        ));
    }

    #[tokio::test]
    async fn test_sources_are_isolated() {
        let buffers = SourceBuffers::new(10, 100);
        buffers.push(item("hn", 0)).await;
        buffers.push(item("rss", 0)).await;
        buffers.push(item("rss", 1)).await;

        assert_eq!(buffers.depth("hn").await, 1);
        assert_eq!(buffers.depth("rss").await, 2);
        assert_eq!(buffers.total_depth().await, 3);
    }

    #[tokio::test]
    async fn test_hard_cap_drains_before_appending() {
        let cap = 5;
        let buffers = SourceBuffers::new(100, cap);

        let mut forced_flushes = 0;
        let total = 12;
        for i in 0..total {
            match buffers.push(item("hn", i)).await {
                PushOutcome::HardCap { drained } => {
                    assert_eq!(drained.len(), cap);
                    forced_flushes += 1;
                    buffers.complete_chunk("hn", |_| {}).await;
                }
                _ => {
                    // Depth may never exceed the cap
                    assert!(buffers.depth("hn").await <= cap);
                }
            }
        }

        // 12 items over a cap of 5: two forced drains, two items still buffered
        assert_eq!(forced_flushes, 2);
        assert_eq!(buffers.depth("hn").await, 2);
    }

    #[tokio::test]
    async fn test_flush_claim_is_exclusive() {
        let buffers = SourceBuffers::new(10, 100);
        buffers.push(item("hn", 0)).await;

        assert!(buffers.try_begin_flush("hn").await);
        assert!(!buffers.try_begin_flush("hn").await);
        assert!(!buffers.try_begin_flush("absent").await);
    }

    #[tokio::test]
    async fn test_drain_returns_stats_once_and_removes_slot() {
        let buffers = SourceBuffers::new(2, 100);
        buffers.push(item("hn", 0)).await;
        buffers.push(item("hn", 1)).await;

        assert!(buffers.try_begin_flush("hn").await);
        let chunk = buffers.take_chunk("hn", 2).await.unwrap();
        assert_eq!(chunk.len(), 2);

        // Flush still claimed: the merge alone must not drain
        let drained = buffers.complete_chunk("hn", |stats| stats.record_written(2, 0)).await;
        assert!(drained.is_none());

        let stats = buffers.end_flush("hn").await.unwrap();
        assert_eq!(stats.total_fetched, 2);
        assert_eq!(stats.new_jobs, 2);

        assert!(buffers.sources().await.is_empty());

        // A new item for the same source starts a fresh run
        buffers.push(item("hn", 2)).await;
        assert_eq!(buffers.depth("hn").await, 1);
    }

    #[tokio::test]
    async fn test_accumulation_during_flush_defers_drain() {
        let buffers = SourceBuffers::new(2, 100);
        buffers.push(item("hn", 0)).await;
        buffers.push(item("hn", 1)).await;

        assert!(buffers.try_begin_flush("hn").await);
        let _chunk = buffers.take_chunk("hn", 2).await.unwrap();

        // A handler appends while the write is in flight
        buffers.push(item("hn", 2)).await;

        buffers.complete_chunk("hn", |stats| stats.record_written(2, 0)).await;
        // Slot is not empty, so ending the flush must not drain it
        assert!(buffers.end_flush("hn").await.is_none());
        assert_eq!(buffers.depth("hn").await, 1);
    }
}
