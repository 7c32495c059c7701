//! Status - 稼働状況の照会
//!
//! カウンタとキューの状態をまとめて返す（`GET /status`）。

use std::sync::Arc;

use serde::Serialize;

use crate::observability::{CountsSnapshot, PipelineCounts};
use crate::queue::{InFlight, ResizeQueue};

/// Everything `GET /status` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub counts: CountsSnapshot,
    pub failed: u64,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub in_flight: usize,
    pub workers: usize,
}

/// Read-only view over the live counters and queue.
#[derive(Clone)]
pub struct StatusReporter {
    counts: Arc<PipelineCounts>,
    queue: ResizeQueue,
    inflight: InFlight,
    workers: usize,
}

impl StatusReporter {
    pub fn new(
        counts: Arc<PipelineCounts>,
        queue: ResizeQueue,
        inflight: InFlight,
        workers: usize,
    ) -> Self {
        Self {
            counts,
            queue,
            inflight,
            workers,
        }
    }

    pub fn snapshot(&self) -> StatusView {
        let counts = self.counts.snapshot();
        StatusView {
            failed: counts.failed(),
            counts,
            queue_depth: self.queue.depth(),
            queue_capacity: self.queue.capacity(),
            in_flight: self.inflight.len(),
            workers: self.workers,
        }
    }
}
