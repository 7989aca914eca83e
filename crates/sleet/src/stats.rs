//! Per-source run statistics.
//!
//! Stats live in the source's buffer slot and accumulate across flushes.
//! When the slot drains they are converted into a `RunSummary` and persisted
//! exactly once; the next item for that source starts a fresh run.

use chrono::Utc;

use sleet_common::types::{FailureSample, RunSummary};

/// Cap on retained failure samples per run.
pub const MAX_FAILURE_SAMPLES: usize = 100;

/// Offending keys retained per failure sample.
pub const KEYS_PER_SAMPLE: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub total_fetched: u64,
    pub new_jobs: u64,
    pub updated_jobs: u64,
    pub failed_jobs: u64,
    pub failures: Vec<FailureSample>,
}

impl RunStats {
    /// Count one item accepted into the buffer.
    pub fn record_fetched(&mut self) {
        self.total_fetched += 1;
    }

    /// Merge a successful chunk write.
    pub fn record_written(&mut self, inserted: u64, updated: u64) {
        self.new_jobs += inserted;
        self.updated_jobs += updated;
    }

    /// Merge failed writes, keeping a bounded failure sample.
    pub fn record_failed(&mut self, count: u64, error: &str, mut keys: Vec<String>) {
        self.failed_jobs += count;
        if self.failures.len() < MAX_FAILURE_SAMPLES {
            keys.truncate(KEYS_PER_SAMPLE);
            self.failures.push(FailureSample {
                error: error.to_string(),
                keys,
            });
        }
    }

    /// Convert into the persisted summary form.
    pub fn into_summary(self, source: &str) -> RunSummary {
        RunSummary {
            source: source.to_string(),
            total_fetched: self.total_fetched,
            new_jobs: self.new_jobs,
            updated_jobs: self.updated_jobs,
            failed_jobs: self.failed_jobs,
            total_imported: self.new_jobs + self.updated_jobs,
            failures: self.failures,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_respect_the_accounting_invariant() {
        let mut stats = RunStats::default();
        for _ in 0..10 {
            stats.record_fetched();
        }
        stats.record_written(4, 3);
        stats.record_failed(2, "write refused", vec!["hn#1".to_string()]);

        // One item still buffered; written + failed never exceeds fetched
        assert!(stats.new_jobs + stats.updated_jobs + stats.failed_jobs <= stats.total_fetched);

        let summary = stats.into_summary("hn");
        assert_eq!(summary.total_imported, 7);
        assert_eq!(summary.failed_jobs, 2);
        assert_eq!(summary.failures.len(), 1);
    }

    #[test]
    fn test_failure_samples_are_bounded() {
        let mut stats = RunStats::default();
        for i in 0..(MAX_FAILURE_SAMPLES + 50) {
            let keys = (0..10).map(|k| format!("hn#{i}-{k}")).collect();
            stats.record_failed(1, "boom", keys);
        }

        assert_eq!(stats.failures.len(), MAX_FAILURE_SAMPLES);
        assert_eq!(stats.failed_jobs, (MAX_FAILURE_SAMPLES + 50) as u64);
        // Each sample keeps at most a few keys
        assert!(stats.failures.iter().all(|f| f.keys.len() <= KEYS_PER_SAMPLE));
    }
}
