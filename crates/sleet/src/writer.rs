//! Bulk reconciliation writer.
//!
//! Writes one chunk per bulk upsert and turns every outcome, including a
//! whole-chunk store failure, into accounting. The engine never retries a
//! chunk; failed items are surfaced through run statistics instead.

use std::sync::Arc;
use tracing::{debug, error};

use sleet_common::emit;
use sleet_common::metrics::events::ChunkFlushed;
use sleet_common::store::JobStore;
use sleet_common::types::WorkItem;

use crate::stats::KEYS_PER_SAMPLE;

/// Accounting for a single written chunk.
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
    /// First error observed, if any writes failed.
    pub error: Option<String>,
    /// Up to a few keys of failed items, for failure samples.
    pub failed_keys: Vec<String>,
}

pub struct BulkWriter {
    store: Arc<dyn JobStore>,
}

impl BulkWriter {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Write one chunk as an unordered bulk upsert. Never fails; a store
    /// error marks the whole chunk failed.
    pub async fn write_chunk(&self, source: &str, chunk: &[WorkItem]) -> ChunkOutcome {
        let outcome = match self.store.bulk_upsert(chunk).await {
            Ok(report) => {
                let failed_keys = report
                    .failed
                    .iter()
                    .take(KEYS_PER_SAMPLE)
                    .map(|f| f.key.job_id())
                    .collect();
                ChunkOutcome {
                    inserted: report.inserted,
                    updated: report.updated,
                    failed: report.failed.len() as u64,
                    error: report.failed.first().map(|f| f.error.clone()),
                    failed_keys,
                }
            }
            Err(e) => {
                error!(source = %source, error = %e, "Bulk upsert failed for entire chunk");
                let failed_keys = chunk
                    .iter()
                    .take(KEYS_PER_SAMPLE)
                    .map(|item| item.key().job_id())
                    .collect();
                ChunkOutcome {
                    failed: chunk.len() as u64,
                    error: Some(e.to_string()),
                    failed_keys,
                    ..Default::default()
                }
            }
        };

        emit!(ChunkFlushed {
            source: source.to_string(),
            inserted: outcome.inserted,
            updated: outcome.updated,
            failed: outcome.failed,
        });
        debug!(
            source = %source,
            inserted = outcome.inserted,
            updated = outcome.updated,
            failed = outcome.failed,
            "Chunk written"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sleet_common::error::StoreError;
    use sleet_common::store::{MemoryStore, SummaryFilter, UpsertReport};
    use sleet_common::types::{ItemKey, RunSummary, StoredJob};

    struct BrokenStore;

    #[async_trait]
    impl JobStore for BrokenStore {
        async fn bulk_upsert(&self, _items: &[WorkItem]) -> Result<UpsertReport, StoreError> {
            Err(StoreError::Unreachable {
                message: "connection refused".to_string(),
            })
        }

        async fn get(&self, _key: &ItemKey) -> Result<Option<StoredJob>, StoreError> {
            Ok(None)
        }

        async fn count(&self) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn insert_run_summary(&self, _summary: RunSummary) -> Result<(), StoreError> {
            Ok(())
        }

        async fn list_run_summaries(
            &self,
            _filter: &SummaryFilter,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<RunSummary>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn items(count: usize) -> Vec<WorkItem> {
        (0..count)
            .map(|i| WorkItem::new("hn", format!("guid-{i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_successful_chunk_reports_inserts_and_updates() {
        let writer = BulkWriter::new(Arc::new(MemoryStore::new()));
        let chunk = items(5);

        let outcome = writer.write_chunk("hn", &chunk).await;
        assert_eq!(outcome.inserted, 5);
        assert_eq!(outcome.failed, 0);

        let outcome = writer.write_chunk("hn", &chunk).await;
        assert_eq!(outcome.updated, 5);
    }

    #[tokio::test]
    async fn test_store_failure_marks_whole_chunk_failed() {
        let writer = BulkWriter::new(Arc::new(BrokenStore));
        let chunk = items(7);

        let outcome = writer.write_chunk("hn", &chunk).await;
        assert_eq!(outcome.failed, 7);
        assert_eq!(outcome.inserted, 0);
        assert!(outcome.error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(outcome.failed_keys.len(), KEYS_PER_SAMPLE);
    }
}
