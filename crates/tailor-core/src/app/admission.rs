//! Admission - 受付判定
//!
//! リクエスト 1 件を「キャッシュヒット」「新規ジョブ」「処理中ジョブに合流」の
//! いずれかに振り分ける。
//!
//! # 順序
//! 1. 入力検証（上限サイズも含む）→ fingerprint
//! 2. index を引く（ヒットなら終わり）
//! 3. in-flight 枠を取る（取れなければ合流）
//! 4. 枠を持ったまま index を再確認（取得前に完了したジョブを拾う）
//! 5. ジョブと枠を一緒に enqueue（満杯なら待つ）

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::config::DEFAULT_MAX_DIMENSION;
use crate::domain::{AdmissionError, Fingerprint, JobId, ResizeJob};
use crate::observability::PipelineCounts;
use crate::ports::{ArtifactIndex, Lookup};
use crate::queue::{InFlight, QueuedJob, ResizeQueue};

/// Raw request parameters as received from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub image_url: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

impl ResizeRequest {
    pub fn new(image_url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            image_url: Some(image_url.into()),
            width: Some(width.to_string()),
            height: Some(height.to_string()),
        }
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRequest {
    /// Trimmed as received. The fingerprint is derived from this.
    pub source_url: String,
    /// Normalized by the url parser; safe to put in a `Location` header.
    pub redirect_url: String,
    pub width: u32,
    pub height: u32,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, AdmissionError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AdmissionError::BadRequest(format!("missing parameter `{name}`")))
}

fn dimension(value: &str, name: &str) -> Result<u32, AdmissionError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AdmissionError::BadRequest(format!(
            "`{name}` must be a positive integer, got {value:?}"
        ))),
    }
}

impl TryFrom<&ResizeRequest> for ValidRequest {
    type Error = AdmissionError;

    fn try_from(request: &ResizeRequest) -> Result<Self, Self::Error> {
        let source_url = required(&request.image_url, "image_url")?;
        let width = dimension(required(&request.width, "width")?, "width")?;
        let height = dimension(required(&request.height, "height")?, "height")?;

        let parsed = url::Url::parse(source_url).map_err(|e| {
            AdmissionError::BadRequest(format!("`image_url` is not a valid url: {e}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
            return Err(AdmissionError::BadRequest(
                "`image_url` must be an absolute http(s) url".to_string(),
            ));
        }

        Ok(Self {
            source_url: source_url.to_string(),
            redirect_url: parsed.into(),
            width,
            height,
        })
    }
}

impl ValidRequest {
    fn check_bounds(&self, max_dimension: u32) -> Result<(), AdmissionError> {
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if value > max_dimension {
                return Err(AdmissionError::BadRequest(format!(
                    "`{name}` must be at most {max_dimension}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Result of admitting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Already produced.
    CacheHit {
        fingerprint: Fingerprint,
        location: String,
    },
    /// A new job was queued. `redirect_url` is the normalized source.
    Enqueued {
        job_id: JobId,
        fingerprint: Fingerprint,
        redirect_url: String,
    },
    /// A job for the same fingerprint is already queued or running.
    InFlight {
        fingerprint: Fingerprint,
        redirect_url: String,
    },
}

impl Admission {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Admission::CacheHit { fingerprint, .. }
            | Admission::Enqueued { fingerprint, .. }
            | Admission::InFlight { fingerprint, .. } => fingerprint,
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        matches!(self, Admission::CacheHit { .. })
    }
}

/// The admission decision, shared by every request handler.
#[derive(Clone)]
pub struct AdmissionService {
    index: Arc<dyn ArtifactIndex>,
    inflight: InFlight,
    queue: ResizeQueue,
    counts: Arc<PipelineCounts>,
    max_dimension: u32,
}

impl AdmissionService {
    pub fn new(
        index: Arc<dyn ArtifactIndex>,
        inflight: InFlight,
        queue: ResizeQueue,
        counts: Arc<PipelineCounts>,
    ) -> Self {
        Self {
            index,
            inflight,
            queue,
            counts,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn queue(&self) -> &ResizeQueue {
        &self.queue
    }

    pub fn inflight(&self) -> &InFlight {
        &self.inflight
    }

    pub async fn admit(&self, request: &ResizeRequest) -> Result<Admission, AdmissionError> {
        let valid = ValidRequest::try_from(request)?;
        self.admit_valid(valid).await
    }

    pub async fn admit_valid(&self, request: ValidRequest) -> Result<Admission, AdmissionError> {
        request.check_bounds(self.max_dimension)?;
        let fingerprint = Fingerprint::derive(&request.source_url, request.width, request.height);

        if let Some(hit) = self.cached(&fingerprint).await? {
            return Ok(hit);
        }

        let Some(flight) = self.inflight.try_acquire(&fingerprint) else {
            self.counts.record_in_flight_join();
            debug!(%fingerprint, "joined in-flight job");
            return Ok(Admission::InFlight {
                fingerprint,
                redirect_url: request.redirect_url,
            });
        };

        // finished between the first lookup and acquiring the slot?
        if let Some(hit) = self.cached(&fingerprint).await? {
            return Ok(hit);
        }

        let job = ResizeJob::new(request.source_url, request.width, request.height);
        let job_id = job.job_id();
        let admission = Admission::Enqueued {
            job_id,
            fingerprint: fingerprint.clone(),
            redirect_url: request.redirect_url,
        };
        // on failure the guard comes back inside the error and is dropped here
        self.queue
            .enqueue(QueuedJob { job, flight })
            .await
            .map_err(|_| AdmissionError::QueueClosed)?;

        self.counts.record_admitted();
        info!(%fingerprint, %job_id, depth = self.queue.depth(), "job enqueued");
        Ok(admission)
    }

    async fn cached(&self, fingerprint: &Fingerprint) -> Result<Option<Admission>, AdmissionError> {
        match self.index.lookup(fingerprint).await? {
            Lookup::Found(record) => {
                self.counts.record_cache_hit();
                debug!(%fingerprint, location = %record.published_location, "cache hit");
                Ok(Some(Admission::CacheHit {
                    fingerprint: fingerprint.clone(),
                    location: record.published_location,
                }))
            }
            Lookup::NotFound => Ok(None),
        }
    }
}
