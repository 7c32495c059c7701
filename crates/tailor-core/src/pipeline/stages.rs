//! Pipeline stages: Fetch -> Transform -> Publish -> Cleanup.
//!
//! Each stage wraps exactly one collaborator. Network stages (fetch, publish)
//! run every attempt under a timeout and the worker's cancellation token, and
//! retry transient failures with backoff. Transform is never retried.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{
    ArtifactRecord, CleanupError, Dimensions, FetchError, IndexError, PublishError, ResizeJob,
    Stage, StageError, TransformError,
};
use crate::observability::PipelineCounts;
use crate::ports::{ArtifactIndex, Clock, Fetcher, ImageTransformer, ObjectStore, PutObject, Visibility};
use crate::queue::RetryPolicy;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Per-job context handed to every stage by the runner.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub work_dir: &'a Path,
    pub cancel: &'a CancellationToken,
    pub counts: &'a PipelineCounts,
}

/// A terminal stage failure plus how many attempts were made.
#[derive(Debug)]
pub struct StageFailure {
    pub error: StageError,
    pub attempts: u32,
}

impl StageFailure {
    pub fn new(error: impl Into<StageError>, attempts: u32) -> Self {
        Self {
            error: error.into(),
            attempts,
        }
    }
}

/// Errors of network-bound stages.
trait NetworkError: Sized + std::fmt::Display {
    fn is_retryable(&self) -> bool;
    fn timed_out(after: Duration) -> Self;
    fn cancelled() -> Self;
}

impl NetworkError for FetchError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    fn timed_out(after: Duration) -> Self {
        FetchError::Timeout(after)
    }

    fn cancelled() -> Self {
        FetchError::Cancelled
    }
}

impl NetworkError for PublishError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    fn timed_out(after: Duration) -> Self {
        PublishError::new(PublishError::TIMEOUT, format!("upload timed out after {after:?}"))
    }

    fn cancelled() -> Self {
        PublishError::new(PublishError::CANCELLED, "upload cancelled")
    }
}

/// Network policy of one stage: per-attempt timeout + retry.
#[derive(Debug, Clone)]
pub struct NetworkPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl NetworkPolicy {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }
}

/// Run `op` until it succeeds, fails permanently, runs out of attempts, or
/// the job is cancelled. Dropping the attempt future (timeout / cancel)
/// aborts the in-flight request.
async fn with_retry<T, E, F, Fut>(
    policy: &NetworkPolicy,
    ctx: StageContext<'_>,
    stage: Stage,
    mut op: F,
) -> Result<T, (E, u32)>
where
    E: NetworkError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let result = tokio::select! {
            _ = ctx.cancel.cancelled() => Err(E::cancelled()),
            r = tokio::time::timeout(policy.timeout, op()) => {
                r.unwrap_or_else(|_| Err(E::timed_out(policy.timeout)))
            }
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() || !policy.retry.allows_retry(attempts) || ctx.cancel.is_cancelled() {
            return Err((err, attempts));
        }

        let delay = policy.retry.jittered_delay(attempts);
        warn!(
            %stage,
            attempt = attempts,
            max_attempts = policy.retry.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, retrying"
        );
        ctx.counts.record_retry();
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err((E::cancelled(), attempts)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Output of the fetch stage.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub path: PathBuf,
    pub bytes: u64,
}

pub struct FetchStage {
    fetcher: Arc<dyn Fetcher>,
    policy: NetworkPolicy,
}

impl FetchStage {
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: NetworkPolicy) -> Self {
        Self { fetcher, policy }
    }

    pub async fn run(&self, job: &ResizeJob, ctx: StageContext<'_>) -> Result<Fetched, StageFailure> {
        let dest = job.original_path(ctx.work_dir);
        let url = job.source_url();
        let bytes = with_retry(&self.policy, ctx, Stage::Fetch, || self.fetcher.fetch(url, &dest))
            .await
            .map_err(|(e, attempts)| StageFailure::new(e, attempts))?;

        info!(url, bytes, path = %dest.display(), "download completed");
        Ok(Fetched { path: dest, bytes })
    }
}

/// Output of the transform stage.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub path: PathBuf,
    pub dimensions: Dimensions,
}

pub struct TransformStage {
    transformer: Arc<dyn ImageTransformer>,
}

impl TransformStage {
    pub fn new(transformer: Arc<dyn ImageTransformer>) -> Self {
        Self { transformer }
    }

    /// Resize on the blocking pool; CPU work is not cancellable.
    pub async fn run(
        &self,
        job: &ResizeJob,
        fetched: &Fetched,
        ctx: StageContext<'_>,
    ) -> Result<Transformed, StageFailure> {
        let transformer = Arc::clone(&self.transformer);
        let source = fetched.path.clone();
        let dest = job.resized_path(ctx.work_dir);
        let width = job.width();

        let dest_for_worker = dest.clone();
        let resized = tokio::task::spawn_blocking(move || {
            transformer.resize(&source, &dest_for_worker, width)
        })
        .await
        .map_err(|e| StageFailure::new(TransformError::Worker(e.to_string()), 1))?;
        let dimensions = resized.map_err(|e| StageFailure::new(e, 1))?;

        info!(
            width = dimensions.width,
            height = dimensions.height,
            path = %dest.display(),
            "resize completed"
        );
        Ok(Transformed {
            path: dest,
            dimensions,
        })
    }
}

/// Output of the publish stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub location: String,
    /// Another job recorded this fingerprint first; `location` is theirs.
    pub deduplicated: bool,
}

/// MIME type sniffed from the leading bytes of an encoded image.
pub fn sniff_content_type(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}

pub struct PublishStage {
    store: Arc<dyn ObjectStore>,
    index: Arc<dyn ArtifactIndex>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    policy: NetworkPolicy,
}

impl PublishStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        index: Arc<dyn ArtifactIndex>,
        clock: Arc<dyn Clock>,
        key_prefix: impl Into<String>,
        policy: NetworkPolicy,
    ) -> Self {
        Self {
            store,
            index,
            clock,
            key_prefix: key_prefix.into(),
            policy,
        }
    }

    /// Upload the resized file, then record the artifact.
    ///
    /// The record only happens after a successful upload, so a failed job
    /// never leaves a record behind.
    pub async fn run(
        &self,
        job: &ResizeJob,
        transformed: &Transformed,
        ctx: StageContext<'_>,
    ) -> Result<Published, StageFailure> {
        let body = tokio::fs::read(&transformed.path).await.map_err(|e| {
            StageFailure::new(
                PublishError::new(
                    PublishError::LOCAL_IO,
                    format!("{}: {e}", transformed.path.display()),
                ),
                1,
            )
        })?;
        let body = Bytes::from(body);
        let content_type = sniff_content_type(&body);
        let key = job.publish_key(&self.key_prefix);

        let location = with_retry(&self.policy, ctx, Stage::Publish, || {
            self.store.put(PutObject {
                key: key.clone(),
                body: body.clone(),
                content_type: content_type.to_string(),
                visibility: Visibility::PublicRead,
            })
        })
        .await
        .map_err(|(e, attempts)| StageFailure::new(e, attempts))?;
        info!(%key, %location, content_type, "upload completed");

        let record = ArtifactRecord::new(job.fingerprint().clone(), &location, self.clock.now());
        match self.index.record(record).await {
            Ok(()) => Ok(Published {
                location,
                deduplicated: false,
            }),
            Err(IndexError::DuplicateKey(fingerprint)) => {
                // first writer wins; report its location
                let existing = self
                    .index
                    .lookup(&fingerprint)
                    .await
                    .ok()
                    .and_then(|lookup| lookup.found())
                    .map(|record| record.published_location)
                    .unwrap_or(location);
                debug!(%fingerprint, location = %existing, "artifact already recorded");
                Ok(Published {
                    location: existing,
                    deduplicated: true,
                })
            }
            Err(e) => Err(StageFailure::new(StageError::Record(e), 1)),
        }
    }
}

/// Removes the fetched original. The resized file stays.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupStage;

impl CleanupStage {
    /// A missing original counts as already cleaned.
    pub async fn run(&self, job: &ResizeJob, work_dir: &Path) -> Result<(), CleanupError> {
        let path = job.original_path(work_dir);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "deleted original");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CleanupError { path, source }),
        }
    }

    /// Best-effort removal of everything a failed job may have left behind.
    pub async fn discard(&self, job: &ResizeJob, work_dir: &Path) {
        for path in [job.original_path(work_dir), job.resized_path(work_dir)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "discarded partial file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not discard partial file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryArtifactIndex;
    use crate::ports::{FixedClock, Lookup};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    /// Fails with the scripted errors first, then writes `body`.
    struct ScriptedFetcher {
        failures: Mutex<Vec<FetchError>>,
        calls: AtomicU32,
        body: &'static [u8],
    }

    impl ScriptedFetcher {
        fn new(failures: Vec<FetchError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
                body: b"original",
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.failures.lock().await.pop() {
                return Err(err);
            }
            tokio::fs::write(dest, self.body).await.unwrap();
            Ok(self.body.len() as u64)
        }
    }

    struct HangingFetcher;

    #[async_trait]
    impl Fetcher for HangingFetcher {
        async fn fetch(&self, _url: &str, _dest: &Path) -> Result<u64, FetchError> {
            std::future::pending().await
        }
    }

    struct RecordingStore {
        puts: Mutex<Vec<PutObject>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put(&self, object: PutObject) -> Result<String, PublishError> {
            let location = format!("https://cdn.example/{}", object.key);
            self.puts.lock().await.push(object);
            Ok(location)
        }
    }

    fn fast_policy() -> NetworkPolicy {
        NetworkPolicy::new(
            Duration::from_secs(5),
            RetryPolicy {
                base_delay: Duration::from_millis(1),
                jitter: 0.0,
                ..RetryPolicy::default()
            },
        )
    }

    fn status(status: u16) -> FetchError {
        FetchError::Status {
            url: "http://host/cat.jpg".to_string(),
            status,
        }
    }

    #[tokio::test]
    async fn fetch_retries_transient_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let counts = PipelineCounts::new();
        let ctx = StageContext { work_dir: dir.path(), cancel: &cancel, counts: &counts };
        let fetcher = Arc::new(ScriptedFetcher::new(vec![status(503), status(500)]));
        let stage = FetchStage::new(fetcher.clone(), fast_policy());
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);

        let fetched = stage.run(&job, ctx).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(fetched.path, job.original_path(dir.path()));
        assert_eq!(counts.snapshot().retries, 2);
    }

    #[tokio::test]
    async fn fetch_gives_up_after_max_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let counts = PipelineCounts::new();
        let ctx = StageContext { work_dir: dir.path(), cancel: &cancel, counts: &counts };
        let fetcher = Arc::new(ScriptedFetcher::new((0..5).map(|_| status(503)).collect()));
        let stage = FetchStage::new(fetcher.clone(), fast_policy());
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);

        let failure = stage.run(&job, ctx).await.unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.error.stage(), Stage::Fetch);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fetch_does_not_retry_permanent_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let counts = PipelineCounts::new();
        let ctx = StageContext { work_dir: dir.path(), cancel: &cancel, counts: &counts };
        let fetcher = Arc::new(ScriptedFetcher::new(vec![status(404)]));
        let stage = FetchStage::new(fetcher.clone(), fast_policy());
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);

        let failure = stage.run(&job, ctx).await.unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_attempts_are_bounded_by_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let counts = PipelineCounts::new();
        let ctx = StageContext { work_dir: dir.path(), cancel: &cancel, counts: &counts };
        let policy = NetworkPolicy::new(Duration::from_millis(20), RetryPolicy::none());
        let stage = FetchStage::new(Arc::new(HangingFetcher), policy);
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);

        let failure = stage.run(&job, ctx).await.unwrap_err();

        assert!(matches!(failure.error, StageError::Fetch(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let counts = PipelineCounts::new();
        let stage = FetchStage::new(Arc::new(HangingFetcher), fast_policy());
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let ctx = StageContext { work_dir: dir.path(), cancel: &cancel, counts: &counts };
        let failure = stage.run(&job, ctx).await.unwrap_err();

        assert!(matches!(failure.error, StageError::Fetch(FetchError::Cancelled)));
    }

    #[tokio::test]
    async fn publish_uploads_then_records() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let counts = PipelineCounts::new();
        let ctx = StageContext { work_dir: dir.path(), cancel: &cancel, counts: &counts };
        let job = ResizeJob::new("http://host/cat.png", 100, 80);

        let png = {
            let mut buf = std::io::Cursor::new(Vec::new());
            image::RgbImage::new(2, 2)
                .write_to(&mut buf, image::ImageFormat::Png)
                .unwrap();
            buf.into_inner()
        };
        let resized = job.resized_path(dir.path());
        std::fs::write(&resized, &png).unwrap();

        let store = Arc::new(RecordingStore { puts: Mutex::new(Vec::new()) });
        let index = Arc::new(InMemoryArtifactIndex::new());
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stage = PublishStage::new(
            store.clone(),
            index.clone(),
            Arc::new(FixedClock::new(at)),
            "images",
            fast_policy(),
        );
        let transformed = Transformed {
            path: resized,
            dimensions: Dimensions::new(2, 2),
        };

        let published = stage.run(&job, &transformed, ctx).await.unwrap();

        let expected = format!("https://cdn.example/images/{}", job.local_file_name());
        assert_eq!(published, Published { location: expected.clone(), deduplicated: false });
        let puts = store.puts.lock().await;
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].content_type, "image/png");
        assert_eq!(puts[0].visibility, Visibility::PublicRead);
        match index.lookup(job.fingerprint()).await.unwrap() {
            Lookup::Found(record) => {
                assert_eq!(record.published_location, expected);
                assert_eq!(record.completed_at, at);
            }
            Lookup::NotFound => panic!("artifact not recorded"),
        }
    }

    #[tokio::test]
    async fn publish_duplicate_key_is_benign() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let counts = PipelineCounts::new();
        let ctx = StageContext { work_dir: dir.path(), cancel: &cancel, counts: &counts };
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);
        let resized = job.resized_path(dir.path());
        std::fs::write(&resized, b"bytes").unwrap();

        let index = Arc::new(InMemoryArtifactIndex::new());
        index
            .record(ArtifactRecord::new(job.fingerprint().clone(), "https://first", Utc::now()))
            .await
            .unwrap();
        let stage = PublishStage::new(
            Arc::new(RecordingStore { puts: Mutex::new(Vec::new()) }),
            index,
            Arc::new(FixedClock::new(Utc::now())),
            "images",
            fast_policy(),
        );
        let transformed = Transformed { path: resized, dimensions: Dimensions::new(1, 1) };

        let published = stage.run(&job, &transformed, ctx).await.unwrap();

        assert_eq!(published, Published { location: "https://first".to_string(), deduplicated: true });
    }

    #[tokio::test]
    async fn cleanup_removes_original_only() {
        let dir = tempfile::tempdir().unwrap();
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);
        std::fs::write(job.original_path(dir.path()), b"o").unwrap();
        std::fs::write(job.resized_path(dir.path()), b"r").unwrap();

        CleanupStage.run(&job, dir.path()).await.unwrap();

        assert!(!job.original_path(dir.path()).exists());
        assert!(job.resized_path(dir.path()).exists());
        // already gone is fine
        CleanupStage.run(&job, dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn discard_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);
        std::fs::write(job.original_path(dir.path()), b"o").unwrap();
        std::fs::write(job.resized_path(dir.path()), b"r").unwrap();

        CleanupStage.discard(&job, dir.path()).await;

        assert!(!job.original_path(dir.path()).exists());
        assert!(!job.resized_path(dir.path()).exists());
    }

    #[test]
    fn sniffs_known_formats() {
        assert_eq!(sniff_content_type(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]), "image/jpeg");
        assert_eq!(sniff_content_type(b"\x89PNG\r\n\x1a\n...."), "image/png");
        assert_eq!(sniff_content_type(b"GIF89a...."), "image/gif");
        assert_eq!(sniff_content_type(b"hello world"), FALLBACK_CONTENT_TYPE);
    }
}
