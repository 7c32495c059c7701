//! Errors - エラー型と分類
//!
//! 各ステージのエラーは `ErrorKind` で運用分類される。
//! Transient だけがリトライ対象。

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fingerprint::Fingerprint;
use super::outcome::Stage;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: ローカル環境の障害（ディスクなど、リトライしない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        self == ErrorKind::Transient
    }
}

/// HTTP statuses worth retrying: server errors, request timeout, throttling.
pub(crate) fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// Admission failures, reported to the caller.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("job queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport { .. } | FetchError::Timeout(_) => ErrorKind::Transient,
            FetchError::Status { status, .. } if is_transient_status(*status) => {
                ErrorKind::Transient
            }
            FetchError::Status { .. } | FetchError::Cancelled => ErrorKind::Permanent,
            FetchError::Io { .. } => ErrorKind::Infrastructure,
        }
    }
}

/// Transform failures are never retried: they mean the image itself is bad.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("decoding {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error("source image has zero width")]
    ZeroWidth,

    #[error("output {width}x{height} exceeds the pixel limit of {limit}")]
    TooLarge { width: u32, height: u32, limit: u64 },

    #[error("encoding {}: {message}", .path.display())]
    Encode { path: PathBuf, message: String },

    #[error("transform worker failed: {0}")]
    Worker(String),
}

impl TransformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::Encode { .. } | TransformError::Worker(_) => {
                ErrorKind::Infrastructure
            }
            TransformError::Decode { .. }
            | TransformError::ZeroWidth
            | TransformError::TooLarge { .. } => ErrorKind::Permanent,
        }
    }
}

/// Object-store failure. Mirrors what storage providers report: a code, a
/// message, and when available the HTTP status and request id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("publish failed: {code}: {message}{}", request_id_suffix(.request_id))]
pub struct PublishError {
    pub code: String,
    pub message: String,
    pub status: Option<u16>,
    pub request_id: Option<String>,
}

fn request_id_suffix(request_id: &Option<String>) -> String {
    request_id
        .as_deref()
        .map(|id| format!(" (request_id={id})"))
        .unwrap_or_default()
}

impl PublishError {
    pub const TRANSPORT: &'static str = "Transport";
    pub const TIMEOUT: &'static str = "Timeout";
    pub const CANCELLED: &'static str = "Cancelled";
    pub const LOCAL_IO: &'static str = "LocalIo";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None,
            request_id: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match (self.code.as_str(), self.status) {
            (Self::TRANSPORT | Self::TIMEOUT, _) => ErrorKind::Transient,
            (Self::LOCAL_IO, _) => ErrorKind::Infrastructure,
            (_, Some(status)) if is_transient_status(status) => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// Benign race outcome: another job already recorded this fingerprint.
    #[error("artifact already recorded for fingerprint {0}")]
    DuplicateKey(Fingerprint),

    #[error("index storage error: {0}")]
    Storage(String),

    #[error("index io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Non-fatal: logged and counted, never fails a job.
#[derive(Debug, Error)]
#[error("removing {}: {source}", .path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// A pipeline stage failure; terminal for the job it happened in.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Recording the artifact after a successful upload failed.
    #[error("recording artifact: {0}")]
    Record(#[source] IndexError),
}

impl StageError {
    pub fn stage(&self) -> Stage {
        match self {
            StageError::Fetch(_) => Stage::Fetch,
            StageError::Transform(_) => Stage::Transform,
            StageError::Publish(_) | StageError::Record(_) => Stage::Publish,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Fetch(e) => e.kind(),
            StageError::Transform(e) => e.kind(),
            StageError::Publish(e) => e.kind(),
            StageError::Record(_) => ErrorKind::Infrastructure,
        }
    }
}
