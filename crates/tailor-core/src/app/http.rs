//! HTTP surface (axum).
//!
//! - `GET /r?image_url=&width=&height=`: 302 to the artifact, or to the
//!   source while it is being produced
//! - `GET /status`: counters and queue state as JSON
//! - `GET /healthz`: liveness

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, HeaderValue, LOCATION};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::domain::AdmissionError;

use super::admission::{Admission, AdmissionService, ResizeRequest, ValidRequest};
use super::status::{StatusReporter, StatusView};

/// Tells callers whether the redirect points at the artifact or the source.
pub const STATUS_HEADER: HeaderName = HeaderName::from_static("x-tailor-status");

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub admission: AdmissionService,
    pub status: StatusReporter,
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::BadRequest(msg) => ApiError::bad_request(msg),
            AdmissionError::QueueClosed => ApiError::service_unavailable("shutting down"),
            AdmissionError::Index(e) => {
                tracing::error!("artifact index error: {}", e);
                ApiError::internal("artifact index unavailable")
            }
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/r", get(resize))
        .route("/status", get(status))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn resize(
    State(state): State<AppState>,
    query: Result<Query<ResizeRequest>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(request) = query?;
    let valid = ValidRequest::try_from(&request)?;
    // built before admission so a bad header can never leave a job behind
    let source_location = HeaderValue::from_str(&valid.redirect_url)
        .map_err(|_| ApiError::bad_request("`image_url` cannot be used as a redirect target"))?;

    let admission = state.admission.admit_valid(valid).await?;

    let (location, tag) = match admission {
        Admission::CacheHit { location, .. } => {
            let location = HeaderValue::from_str(&location).map_err(|_| {
                ApiError::internal(format!("artifact location is not a valid header: {location}"))
            })?;
            (location, "cached")
        }
        Admission::Enqueued { .. } | Admission::InFlight { .. } => (source_location, "processing"),
    };

    Ok((
        StatusCode::FOUND,
        [(LOCATION, location), (STATUS_HEADER, HeaderValue::from_static(tag))],
    )
        .into_response())
}

async fn status(State(state): State<AppState>) -> Json<StatusView> {
    Json(state.status.snapshot())
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactRecord, Fingerprint};
    use crate::impls::InMemoryArtifactIndex;
    use crate::observability::PipelineCounts;
    use crate::ports::ArtifactIndex;
    use crate::queue::{InFlight, ResizeReceiver, bounded};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::Utc;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<InMemoryArtifactIndex>, ResizeReceiver) {
        let index = Arc::new(InMemoryArtifactIndex::new());
        let counts = Arc::new(PipelineCounts::new());
        let inflight = InFlight::new();
        let (queue, receiver) = bounded(4);
        let state = AppState {
            admission: AdmissionService::new(
                index.clone(),
                inflight.clone(),
                queue.clone(),
                counts.clone(),
            ),
            status: StatusReporter::new(counts, queue, inflight, 1),
        };
        (router(state), index, receiver)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn miss_redirects_to_source_and_enqueues() {
        let (app, _index, receiver) = app();

        let response = app
            .oneshot(get("/r?image_url=http://host/cat.jpg&width=100&height=80"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "http://host/cat.jpg");
        assert_eq!(response.headers()[&STATUS_HEADER], "processing");
        let queued = receiver.dequeue().await.unwrap();
        assert_eq!(queued.job.width(), 100);
    }

    #[tokio::test]
    async fn hit_redirects_to_artifact() {
        let (app, index, _receiver) = app();
        let fp = Fingerprint::derive("http://host/cat.jpg", 100, 80);
        index
            .record(ArtifactRecord::new(fp, "https://cdn/images/cat.jpg", Utc::now()))
            .await
            .unwrap();

        let response = app
            .oneshot(get("/r?image_url=http://host/cat.jpg&width=100&height=80"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "https://cdn/images/cat.jpg");
        assert_eq!(response.headers()[&STATUS_HEADER], "cached");
    }

    #[tokio::test]
    async fn invalid_request_is_bad_request() {
        let (app, _index, _receiver) = app();

        let response = app
            .oneshot(get("/r?image_url=http://host/cat.jpg&width=wide&height=80"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn undeserializable_query_is_a_json_bad_request() {
        let (app, _index, receiver) = app();

        let response = app
            .oneshot(get(
                "/r?image_url=http://host/a.jpg&image_url=http://host/b.jpg&width=100&height=80",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
        receiver.close();
        assert!(receiver.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn processing_redirect_uses_the_normalized_source() {
        let (app, _index, receiver) = app();

        // %0A decodes to an interior newline, which the url parser strips
        let response = app
            .oneshot(get("/r?image_url=http://host/a%0Ab%20cat.jpg&width=100&height=80"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "http://host/ab%20cat.jpg");
        assert_eq!(response.headers()[&STATUS_HEADER], "processing");
        let queued = receiver.dequeue().await.unwrap();
        assert_eq!(queued.job.source_url(), "http://host/a\nb cat.jpg");
    }

    #[tokio::test]
    async fn oversized_width_is_a_bad_request() {
        let (app, _index, receiver) = app();

        let response = app
            .oneshot(get("/r?image_url=http://host/cat.png&width=100000&height=1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "BAD_REQUEST");
        receiver.close();
        assert!(receiver.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn closed_queue_is_service_unavailable() {
        let (app, _index, receiver) = app();
        drop(receiver);

        let response = app
            .oneshot(get("/r?image_url=http://host/cat.jpg&width=100&height=80"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn status_reports_counters() {
        let (app, _index, _receiver) = app();

        let _ = app
            .clone()
            .oneshot(get("/r?image_url=http://host/cat.jpg&width=100&height=80"))
            .await
            .unwrap();
        let response = app.oneshot(get("/status")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["admitted"], 1);
        assert_eq!(body["queue_depth"], 1);
        assert_eq!(body["queue_capacity"], 4);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let (app, _index, _receiver) = app();
        let response = app.oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
