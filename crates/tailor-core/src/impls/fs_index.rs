//! FsArtifactIndex - ディレクトリ上の成果物インデックス
//!
//! 1 fingerprint = 1 JSON ファイル（`<dir>/<fingerprint>.json`）。
//!
//! # アトミック性
//! 一時ファイルに書いてから hard link で本名を作る。link は既存ファイルがあると
//! 失敗するので、同じディレクトリを共有するスレッド・プロセス間でも
//! 「最初の 1 件だけが勝つ」。読み手が書きかけのファイルを見ることもない。

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use ulid::Ulid;

use crate::domain::{ArtifactRecord, Fingerprint, IndexError};
use crate::ports::{ArtifactIndex, Lookup};

/// Durable index backed by one JSON file per fingerprint.
#[derive(Debug, Clone)]
pub struct FsArtifactIndex {
    dir: PathBuf,
}

impl FsArtifactIndex {
    /// Open (creating if needed) an index rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| IndexError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }
}

#[async_trait]
impl ArtifactIndex for FsArtifactIndex {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Lookup, IndexError> {
        let path = self.record_path(fingerprint);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Lookup::NotFound),
            Err(source) => return Err(IndexError::Io { path, source }),
        };
        let record: ArtifactRecord = serde_json::from_slice(&raw).map_err(|e| {
            IndexError::Storage(format!("corrupt record {}: {e}", path.display()))
        })?;
        Ok(Lookup::Found(record))
    }

    async fn record(&self, record: ArtifactRecord) -> Result<(), IndexError> {
        let path = self.record_path(&record.fingerprint);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", record.fingerprint, Ulid::new()));

        let body = serde_json::to_vec_pretty(&record)
            .map_err(|e| IndexError::Storage(format!("encode record: {e}")))?;
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|source| IndexError::Io {
                path: tmp.clone(),
                source,
            })?;

        let linked = tokio::fs::hard_link(&tmp, &path).await;
        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            debug!(path = %tmp.display(), error = %e, "leaving stale index temp file");
        }

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(IndexError::DuplicateKey(record.fingerprint))
            }
            Err(source) => Err(IndexError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn record_for(location: &str) -> ArtifactRecord {
        ArtifactRecord::new(
            Fingerprint::derive("http://host/cat.jpg", 100, 80),
            location,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn record_then_lookup_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = record_for("https://cdn/cat");
        {
            let index = FsArtifactIndex::open(dir.path()).await.unwrap();
            assert_eq!(index.lookup(&record.fingerprint).await.unwrap(), Lookup::NotFound);
            index.record(record.clone()).await.unwrap();
        }

        let reopened = FsArtifactIndex::open(dir.path()).await.unwrap();
        assert_eq!(
            reopened.lookup(&record.fingerprint).await.unwrap(),
            Lookup::Found(record)
        );
    }

    #[tokio::test]
    async fn duplicate_record_keeps_first_and_cleans_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = FsArtifactIndex::open(dir.path()).await.unwrap();

        index.record(record_for("first")).await.unwrap();
        let err = index.record(record_for("second")).await.unwrap_err();
        assert!(matches!(err, IndexError::DuplicateKey(_)));

        let fp = Fingerprint::derive("http://host/cat.jpg", 100, 80);
        let found = index.lookup(&fp).await.unwrap().found().unwrap();
        assert_eq!(found.published_location, "first");

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec![format!("{fp}.json")]);
    }

    #[tokio::test]
    async fn concurrent_records_yield_exactly_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(FsArtifactIndex::open(dir.path()).await.unwrap());

        let mut joins = Vec::new();
        for i in 0..8 {
            let index = Arc::clone(&index);
            joins.push(tokio::spawn(async move {
                index.record(record_for(&format!("loc-{i}"))).await.is_ok()
            }));
        }
        let mut winners = 0;
        for join in joins {
            if join.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn corrupt_record_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = FsArtifactIndex::open(dir.path()).await.unwrap();
        let fp = Fingerprint::derive("http://host/cat.jpg", 100, 80);
        std::fs::write(dir.path().join(format!("{fp}.json")), b"{not json").unwrap();

        let err = index.lookup(&fp).await.unwrap_err();
        assert!(matches!(err, IndexError::Storage(_)));
    }
}
