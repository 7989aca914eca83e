//! In-process job store.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{ItemKey, RunSummary, StoredJob, WorkItem};

use super::{FailedWrite, JobStore, SummaryFilter, UpsertReport};

/// In-process job store keyed by `(source, guid)`.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<ItemKey, StoredJob>>,
    summaries: RwLock<Vec<RunSummary>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn bulk_upsert(&self, items: &[WorkItem]) -> Result<UpsertReport, StoreError> {
        let mut jobs = self.jobs.write().await;
        let mut report = UpsertReport::default();

        for item in items {
            if !item.has_identity() {
                report.failed.push(FailedWrite {
                    key: item.key(),
                    error: "missing source or guid".to_string(),
                });
                continue;
            }

            let now = Utc::now();
            match jobs.entry(item.key()) {
                Entry::Occupied(mut occupied) => {
                    let stored = occupied.get_mut();
                    stored.item = item.clone();
                    stored.updated_at = now;
                    report.updated += 1;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(StoredJob {
                        item: item.clone(),
                        created_at: now,
                        updated_at: now,
                    });
                    report.inserted += 1;
                }
            }
        }

        Ok(report)
    }

    async fn get(&self, key: &ItemKey) -> Result<Option<StoredJob>, StoreError> {
        Ok(self.jobs.read().await.get(key).cloned())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.jobs.read().await.len())
    }

    async fn insert_run_summary(&self, summary: RunSummary) -> Result<(), StoreError> {
        self.summaries.write().await.push(summary);
        Ok(())
    }

    async fn list_run_summaries(
        &self,
        filter: &SummaryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RunSummary>, StoreError> {
        let summaries = self.summaries.read().await;
        let mut matching: Vec<RunSummary> = summaries
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}
