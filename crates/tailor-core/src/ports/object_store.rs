//! ObjectStore port - 永続ストレージ（S3 互換 / ローカル）
//!
//! 認証・署名は実装側の責務（このクレートでは扱わない）。

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::PublishError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    PublicRead,
    Private,
}

impl Visibility {
    /// Canned ACL name as used by S3-compatible providers.
    pub fn as_acl(self) -> &'static str {
        match self {
            Visibility::PublicRead => "public-read",
            Visibility::Private => "private",
        }
    }
}

/// One upload request.
#[derive(Debug, Clone)]
pub struct PutObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub visibility: Visibility,
}

/// Durable object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `object` and return its durable location (URL).
    async fn put(&self, object: PutObject) -> Result<String, PublishError>;
}
