//! Queue module: bounded job queue, single-flight registry, retry policy.

pub mod inflight;
pub mod job_queue;
pub mod retry;

pub use inflight::{FlightGuard, InFlight};
pub use job_queue::{JobQueue, JobReceiver, QueueClosed, TryEnqueueError, bounded};
pub use retry::RetryPolicy;

use crate::domain::ResizeJob;

/// What travels through the queue: the job plus its single-flight claim.
///
/// Design intent:
/// - The guard is released when this value is dropped, i.e. after the worker
///   finished cleanup, after a terminal failure, or when enqueue fails.
/// - Workers only read `job`; nothing mutates it after admission.
#[derive(Debug)]
pub struct QueuedJob {
    pub job: ResizeJob,
    pub flight: FlightGuard,
}

pub type ResizeQueue = JobQueue<QueuedJob>;
pub type ResizeReceiver = JobReceiver<QueuedJob>;
