//! Data types shared across the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Dedup identity of a work item.
///
/// Two items with the same `(source, guid)` pair describe the same logical
/// record; later deliveries overwrite earlier ones in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub source: String,
    pub guid: String,
}

impl ItemKey {
    pub fn new(source: impl Into<String>, guid: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            guid: guid.into(),
        }
    }

    /// Stable queue identity for this key, used for idempotent enqueueing.
    pub fn job_id(&self) -> String {
        format!("{}#{}", self.source, self.guid)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.guid)
    }
}

/// A single unit of work flowing through the queue.
///
/// Only `source` and `guid` are required; everything else is carried through
/// to the store as-is. Unknown payload fields are preserved in `raw` by the
/// producer side, not silently dropped here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl WorkItem {
    pub fn new(source: impl Into<String>, guid: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            guid: guid.into(),
            ..Default::default()
        }
    }

    /// The dedup identity of this item.
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.source.clone(), self.guid.clone())
    }

    /// True when both identity fields are present and non-empty.
    pub fn has_identity(&self) -> bool {
        !self.source.is_empty() && !self.guid.is_empty()
    }
}

/// Persisted form of a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredJob {
    #[serde(flatten)]
    pub item: WorkItem,
    /// Set once, when the key is first inserted.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every upsert.
    pub updated_at: DateTime<Utc>,
}

/// One retained failure from a run, with up to a few offending keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSample {
    pub error: String,
    pub keys: Vec<String>,
}

/// Persisted per-source summary, written when a source's buffer drains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub source: String,
    pub total_fetched: u64,
    pub new_jobs: u64,
    pub updated_jobs: u64,
    pub failed_jobs: u64,
    /// `new_jobs + updated_jobs`.
    pub total_imported: u64,
    pub failures: Vec<FailureSample>,
    pub created_at: DateTime<Utc>,
}

/// A message that exhausted its delivery attempts.
///
/// The payload is preserved verbatim, whatever shape it arrived in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: String,
    pub payload: serde_json::Value,
    pub reason: String,
    pub attempts_made: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(payload: serde_json::Value, reason: impl Into<String>, attempts_made: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            reason: reason.into(),
            attempts_made,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_id_format() {
        let key = ItemKey::new("hn", "item-42");
        assert_eq!(key.job_id(), "hn#item-42");
        assert_eq!(key.to_string(), "hn#item-42");
    }

    #[test]
    fn test_work_item_identity() {
        assert!(WorkItem::new("hn", "1").has_identity());
        assert!(!WorkItem::new("", "1").has_identity());
        assert!(!WorkItem::new("hn", "").has_identity());
    }

    #[test]
    fn test_work_item_tolerates_missing_optional_fields() {
        let item: WorkItem =
            serde_json::from_value(json!({"source": "hn", "guid": "1"})).unwrap();
        assert_eq!(item.key(), ItemKey::new("hn", "1"));
        assert!(item.title.is_none());
    }

    #[test]
    fn test_work_item_defaults_missing_identity_to_empty() {
        // Identity validation happens in the worker, not in serde.
        let item: WorkItem = serde_json::from_value(json!({"title": "hello"})).unwrap();
        assert!(!item.has_identity());
        assert_eq!(item.title.as_deref(), Some("hello"));
    }

    #[test]
    fn test_dead_letter_entry_preserves_payload() {
        let payload = json!({"anything": [1, 2, 3]});
        let entry = DeadLetterEntry::new(payload.clone(), "boom", 3);
        assert_eq!(entry.payload, payload);
        assert_eq!(entry.attempts_made, 3);
        assert!(!entry.id.is_empty());
    }
}
