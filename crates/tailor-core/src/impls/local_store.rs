//! LocalObjectStore - ローカルディレクトリを「バケット」として使う ObjectStore
//!
//! 開発・テスト用。静的ファイルサーバ（または CDN のオリジン）が `root` を
//! `public_base_url` で配信している前提で、その URL を返す。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use ulid::Ulid;

use crate::domain::PublishError;
use crate::ports::{ObjectStore, PutObject};

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under `root`, refusing anything that could escape it.
    fn object_path(&self, key: &str) -> Result<PathBuf, PublishError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(PublishError::new("InvalidKey", format!("unsafe object key {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

fn local_io(path: &Path, err: std::io::Error) -> PublishError {
    PublishError::new(
        PublishError::LOCAL_IO,
        format!("{}: {err}", path.display()),
    )
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, object: PutObject) -> Result<String, PublishError> {
        let path = self.object_path(&object.key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| local_io(parent, e))?;
        }

        // write-then-rename so readers never see a partial object
        let tmp = path.with_file_name(format!(".{}.tmp", Ulid::new()));
        tokio::fs::write(&tmp, &object.body)
            .await
            .map_err(|e| local_io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| local_io(&path, e))?;

        debug!(
            key = %object.key,
            bytes = object.body.len(),
            content_type = %object.content_type,
            acl = object.visibility.as_acl(),
            "stored object locally"
        );
        Ok(format!("{}/{}", self.public_base_url, object.key))
    }
}
