//! HttpObjectStore - S3 互換エンドポイントへの path-style PUT
//!
//! `PUT <endpoint>/<bucket>/<key>` に `x-amz-acl` と `content-type` を付けて送る。
//! 署名・認証はこのクレートの対象外。必要ならプロキシや事前署名を使い、
//! 固定ヘッダは `with_header` で渡す。

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::domain::PublishError;
use crate::ports::{ObjectStore, PutObject};

const ACL_HEADER: &str = "x-amz-acl";
const REQUEST_ID_HEADER: &str = "x-amz-request-id";

#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    public_base_url: Option<String>,
    headers: HeaderMap,
}

impl HttpObjectStore {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            public_base_url: None,
            headers: HeaderMap::new(),
        }
    }

    /// Return `<base>/<key>` as the location instead of the upload URL
    /// (e.g. a CDN in front of the bucket).
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    /// Static header sent with every upload.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key.trim_start_matches('/'))
    }
}

/// Text between `<tag>` and `</tag>` in an S3-style XML error body.
fn xml_field<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, object: PutObject) -> Result<String, PublishError> {
        let url = self.object_url(&object.key);
        let size = object.body.len();
        let response = self
            .client
            .put(&url)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, object.content_type.as_str())
            .header(ACL_HEADER, object.visibility.as_acl())
            .body(object.body)
            .send()
            .await
            .map_err(|e| PublishError::new(PublishError::TRANSPORT, e.to_string()))?;

        let status = response.status();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let code = xml_field(&body, "Code")
                .map(str::to_string)
                .unwrap_or_else(|| format!("Http{}", status.as_u16()));
            let message = xml_field(&body, "Message")
                .map(str::to_string)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("upload failed").to_string());
            let mut err = PublishError::new(code, message).with_status(status.as_u16());
            if let Some(id) = request_id {
                err = err.with_request_id(id);
            }
            return Err(err);
        }

        debug!(%url, bytes = size, request_id = ?request_id, "uploaded object");
        Ok(match &self.public_base_url {
            Some(base) => format!("{base}/{}", object.key.trim_start_matches('/')),
            None => url,
        })
    }
}
