//! OutcomeSink port - ジョブ結果の通知
//!
//! - NoopOutcomeSink: 何もしない（デフォルト）
//! - ChannelOutcomeSink: mpsc に流す（テスト・外部集計用）

use tokio::sync::mpsc;

use crate::domain::{Fingerprint, JobId, PipelineOutcome, ResizeJob};

/// Receives the terminal outcome of every job. Must not block.
pub trait OutcomeSink: Send + Sync {
    fn emit(&self, job: &ResizeJob, outcome: &PipelineOutcome);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOutcomeSink;

impl OutcomeSink for NoopOutcomeSink {
    fn emit(&self, _job: &ResizeJob, _outcome: &PipelineOutcome) {}
}

/// An outcome as delivered through [`ChannelOutcomeSink`].
#[derive(Debug, Clone)]
pub struct OutcomeEvent {
    pub job_id: JobId,
    pub fingerprint: Fingerprint,
    pub outcome: PipelineOutcome,
}

/// Forwards outcomes to an unbounded channel. Dropped receivers are ignored.
#[derive(Debug, Clone)]
pub struct ChannelOutcomeSink {
    tx: mpsc::UnboundedSender<OutcomeEvent>,
}

impl ChannelOutcomeSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutcomeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutcomeSink for ChannelOutcomeSink {
    fn emit(&self, job: &ResizeJob, outcome: &PipelineOutcome) {
        // ignore send error: nobody is listening anymore
        let _ = self.tx.send(OutcomeEvent {
            job_id: job.job_id(),
            fingerprint: job.fingerprint().clone(),
            outcome: outcome.clone(),
        });
    }
}
