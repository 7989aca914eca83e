//! Job store boundary.
//!
//! The worker persists jobs and run summaries through this trait; the
//! concrete database is an integration concern. `MemoryStore` is the
//! in-process implementation used by local mode and tests.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{ItemKey, RunSummary, StoredJob, WorkItem};

/// One item a bulk upsert could not write.
#[derive(Debug, Clone)]
pub struct FailedWrite {
    pub key: ItemKey,
    pub error: String,
}

/// Accounting for a single bulk upsert.
#[derive(Debug, Clone, Default)]
pub struct UpsertReport {
    pub inserted: u64,
    pub updated: u64,
    pub failed: Vec<FailedWrite>,
}

/// Filter for run summary listings.
#[derive(Debug, Clone, Default)]
pub struct SummaryFilter {
    /// Substring match on the source name.
    pub source_contains: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
}

impl SummaryFilter {
    pub fn matches(&self, summary: &RunSummary) -> bool {
        if let Some(needle) = &self.source_contains {
            if !summary.source.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if summary.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if summary.created_at > to {
                return false;
            }
        }
        true
    }
}

/// The persistence boundary.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Upsert a chunk of items keyed by `(source, guid)`, unordered.
    ///
    /// A failure on one item must not abort its siblings; per-item failures
    /// are reported in the returned accounting instead.
    async fn bulk_upsert(&self, items: &[WorkItem]) -> Result<UpsertReport, StoreError>;

    /// Fetch a stored job by key.
    async fn get(&self, key: &ItemKey) -> Result<Option<StoredJob>, StoreError>;

    /// Number of stored jobs.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Persist a per-source run summary.
    async fn insert_run_summary(&self, summary: RunSummary) -> Result<(), StoreError>;

    /// List run summaries, newest first.
    async fn list_run_summaries(
        &self,
        filter: &SummaryFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RunSummary>, StoreError>;
}
