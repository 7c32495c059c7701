//! Fetcher port - ソース画像のダウンロード

use std::path::Path;

use async_trait::async_trait;

use crate::domain::FetchError;

/// Downloads `url` (following redirects) and materializes it at `dest`.
///
/// Creates exactly one local file on success. Returns the byte count.
/// Implementations should not enforce their own overall deadline; the fetch
/// stage wraps each attempt in a timeout.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}
