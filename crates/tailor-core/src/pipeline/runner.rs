//! Per-job chain: Fetch -> Transform -> Publish -> Cleanup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::domain::{PipelineOutcome, ResizeJob};
use crate::observability::PipelineCounts;
use crate::ports::{NoopOutcomeSink, OutcomeSink};

use super::stages::{
    CleanupStage, FetchStage, PublishStage, Published, StageContext, StageFailure, TransformStage,
};

/// Runs one job through every stage and reports the outcome.
///
/// - The chain stops at the first failing stage. Nothing is recorded then.
/// - A job never panics out of `process`, and never returns an error: every
///   result becomes a [`PipelineOutcome`].
pub struct Pipeline {
    work_dir: PathBuf,
    fetch: FetchStage,
    transform: TransformStage,
    publish: PublishStage,
    cleanup: CleanupStage,
    counts: Arc<PipelineCounts>,
    sink: Arc<dyn OutcomeSink>,
}

impl Pipeline {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        fetch: FetchStage,
        transform: TransformStage,
        publish: PublishStage,
        counts: Arc<PipelineCounts>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            fetch,
            transform,
            publish,
            cleanup: CleanupStage,
            counts,
            sink: Arc::new(NoopOutcomeSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn counts(&self) -> &Arc<PipelineCounts> {
        &self.counts
    }

    /// Execute `job` to completion.
    pub async fn process(&self, job: &ResizeJob, cancel: &CancellationToken) -> PipelineOutcome {
        let span = info_span!(
            "job",
            job_id = %job.job_id(),
            fingerprint = %job.fingerprint(),
        );
        async {
            info!(url = job.source_url(), width = job.width(), "job started");

            let outcome = match self.run_stages(job, cancel).await {
                Ok(published) => {
                    let outcome = if published.deduplicated {
                        PipelineOutcome::deduplicated(published.location)
                    } else {
                        PipelineOutcome::succeeded(published.location)
                    };
                    match self.cleanup.run(job, &self.work_dir).await {
                        Ok(()) => outcome,
                        Err(e) => {
                            warn!(stage = "cleanup", error = %e, "cleanup failed");
                            outcome.with_cleanup_error(&e)
                        }
                    }
                }
                Err(failure) => {
                    error!(
                        stage = %failure.error.stage(),
                        kind = ?failure.error.kind(),
                        attempts = failure.attempts,
                        error = %failure.error,
                        "job failed"
                    );
                    self.cleanup.discard(job, &self.work_dir).await;
                    PipelineOutcome::failed(&failure.error, failure.attempts)
                }
            };

            if let Some(location) = outcome.location() {
                info!(location, "job succeeded");
            }
            self.counts.record_outcome(&outcome);
            self.sink.emit(job, &outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        job: &ResizeJob,
        cancel: &CancellationToken,
    ) -> Result<Published, StageFailure> {
        let ctx = StageContext {
            work_dir: &self.work_dir,
            cancel,
            counts: &self.counts,
        };
        let fetched = self.fetch.run(job, ctx).await?;
        let transformed = self.transform.run(job, &fetched, ctx).await?;
        self.publish.run(job, &transformed, ctx).await
    }
}
