//! ReqwestFetcher - HTTP でソース画像を取得する Fetcher
//!
//! リダイレクトは reqwest の制限付きポリシーで追従する。
//! ボディはチャンク単位でファイルに書き出す（全体をメモリに載せない）。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::FetchError;
use crate::ports::Fetcher;

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(connect_timeout)
            .user_agent(concat!("tailor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn transport(url: &str, err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(url, e))?;

        let status = response.status();
        debug!(url, status = status.as_u16(), final_url = %response.url(), "fetch response");
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let io_err = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| transport(url, e))? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::Redirect;
    use axum::routing::get;
    use rstest::rstest;

    const BODY: &[u8] = b"not really a jpeg";

    async fn serve() -> String {
        let app = Router::new()
            .route("/cat.jpg", get(|| async { BODY }))
            .route("/moved", get(|| async { Redirect::temporary("/cat.jpg") }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route("/broken", get(|| async { StatusCode::BAD_GATEWAY }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fetcher() -> ReqwestFetcher {
        ReqwestFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[rstest]
    #[case("/cat.jpg")]
    #[case("/moved")]
    #[tokio::test]
    async fn downloads_body_to_file(#[case] path: &str) {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.jpg");

        let n = fetcher().fetch(&format!("{base}{path}"), &dest).await.unwrap();

        assert_eq!(n, BODY.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
    }

    #[rstest]
    #[case("/missing", 404)]
    #[case("/broken", 502)]
    #[tokio::test]
    async fn non_success_status_is_an_error(#[case] path: &str, #[case] expected: u16) {
        let base = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.jpg");

        let err = fetcher().fetch(&format!("{base}{path}"), &dest).await.unwrap_err();

        assert!(matches!(err, FetchError::Status { status, .. } if status == expected));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher()
            .fetch(&format!("http://{addr}/cat.jpg"), &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(err.kind().is_retryable());
    }
}
