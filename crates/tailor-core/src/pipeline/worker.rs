use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

use crate::queue::{QueuedJob, ResizeReceiver};

use super::runner::Pipeline;

/// Worker group handle.
/// - `request_shutdown()` でワーカー全体が止まる（実行中ジョブのネットワーク処理も中断）
/// - `join()` でキューが閉じて空になるまで待てる
pub struct WorkerGroup {
    cancel: CancellationToken,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers sharing one receiver.
    pub fn spawn(n: usize, receiver: ResizeReceiver, pipeline: Arc<Pipeline>) -> Self {
        let cancel = CancellationToken::new();

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let rx = receiver.clone();
            let pipeline = Arc::clone(&pipeline);
            let cancel = cancel.clone();

            let join = tokio::spawn(
                worker_loop(worker_id, rx, pipeline, cancel)
                    .instrument(info_span!("worker", worker_id)),
            );
            joins.push(join);
        }

        Self { cancel, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Token shared by every worker; cancelling it is the same as
    /// [`request_shutdown`](Self::request_shutdown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop taking jobs and abort in-flight network stages.
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for every worker to exit, without cancelling them.
    /// Workers exit once the queue is closed and drained.
    pub async fn join(self) {
        for j in self.joins {
            let _ = j.await;
        }
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        self.join().await;
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: ResizeReceiver,
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
) {
    debug!("worker started");
    loop {
        // dequeue は待つ可能性があるので select で shutdown と競合させる
        let queued = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            queued = receiver.dequeue() => queued,
        };

        let Some(queued) = queued else {
            // 全 producer が drop されてキューが空
            break;
        };

        run_isolated(worker_id, queued, &pipeline, &cancel).await;
    }
    info!("worker stopped");
}

/// Run one job in its own task so a panic inside a stage cannot take the
/// worker down. The flight guard is released when `queued` drops, on every
/// path including the panic one.
async fn run_isolated(
    worker_id: usize,
    queued: QueuedJob,
    pipeline: &Arc<Pipeline>,
    cancel: &CancellationToken,
) {
    let job_id = queued.job.job_id();
    let pipeline = Arc::clone(pipeline);
    let cancel = cancel.clone();

    let handle = tokio::spawn(
        async move {
            let outcome = pipeline.process(&queued.job, &cancel).await;
            drop(queued);
            outcome
        }
        .in_current_span(),
    );

    if let Err(e) = handle.await {
        error!(worker_id, %job_id, error = %e, "job task aborted");
    }
}
