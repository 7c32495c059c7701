//! Counters for admission and pipeline outcomes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::{PipelineOutcome, Stage};

/// Point-in-time copy of [`PipelineCounts`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsSnapshot {
    pub admitted: u64,
    pub cache_hits: u64,
    pub in_flight_joins: u64,
    pub succeeded: u64,
    pub deduplicated: u64,
    pub failed_fetch: u64,
    pub failed_transform: u64,
    pub failed_publish: u64,
    pub cleanup_failures: u64,
    pub retries: u64,
}

impl CountsSnapshot {
    pub fn failed(&self) -> u64 {
        self.failed_fetch + self.failed_transform + self.failed_publish
    }
}

/// Lock-free counters shared by the admission path and all workers.
#[derive(Debug, Default)]
pub struct PipelineCounts {
    admitted: AtomicU64,
    cache_hits: AtomicU64,
    in_flight_joins: AtomicU64,
    succeeded: AtomicU64,
    deduplicated: AtomicU64,
    failed_fetch: AtomicU64,
    failed_transform: AtomicU64,
    failed_publish: AtomicU64,
    cleanup_failures: AtomicU64,
    retries: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        bump(&self.admitted);
    }

    pub fn record_cache_hit(&self) {
        bump(&self.cache_hits);
    }

    pub fn record_in_flight_join(&self) {
        bump(&self.in_flight_joins);
    }

    pub fn record_retry(&self) {
        bump(&self.retries);
    }

    pub fn record_outcome(&self, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::Succeeded {
                deduplicated,
                cleanup_error,
                ..
            } => {
                bump(&self.succeeded);
                if *deduplicated {
                    bump(&self.deduplicated);
                }
                if cleanup_error.is_some() {
                    bump(&self.cleanup_failures);
                }
            }
            PipelineOutcome::Failed { stage, .. } => match stage {
                Stage::Fetch => bump(&self.failed_fetch),
                Stage::Transform => bump(&self.failed_transform),
                Stage::Publish => bump(&self.failed_publish),
            },
        }
    }

    pub fn snapshot(&self) -> CountsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountsSnapshot {
            admitted: get(&self.admitted),
            cache_hits: get(&self.cache_hits),
            in_flight_joins: get(&self.in_flight_joins),
            succeeded: get(&self.succeeded),
            deduplicated: get(&self.deduplicated),
            failed_fetch: get(&self.failed_fetch),
            failed_transform: get(&self.failed_transform),
            failed_publish: get(&self.failed_publish),
            cleanup_failures: get(&self.cleanup_failures),
            retries: get(&self.retries),
        }
    }
}
