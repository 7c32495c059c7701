//! ArtifactIndex port - 成果物インデックス
//!
//! 「この fingerprint はもう生成済みか？」「どこにあるか？」に答える。
//!
//! # 実装
//! - **InMemoryArtifactIndex**: プロセス内（単一プロセス構成・テスト用）
//! - **FsArtifactIndex**: ディレクトリ上の JSON（再起動・複数プロセスで共有可）

use async_trait::async_trait;

use crate::domain::{ArtifactRecord, Fingerprint, IndexError};

/// Result of an index lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(ArtifactRecord),
    NotFound,
}

impl Lookup {
    pub fn found(self) -> Option<ArtifactRecord> {
        match self {
            Lookup::Found(record) => Some(record),
            Lookup::NotFound => None,
        }
    }
}

/// Lookup + insert-once store of published artifacts.
///
/// # 設計原則
/// - `record` は fingerprint 単位でアトミック（check-and-insert）
/// - 既存レコードがあれば `IndexError::DuplicateKey`、上書きしない
/// - レコードは作成後に更新・削除されない
#[async_trait]
pub trait ArtifactIndex: Send + Sync {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Lookup, IndexError>;

    /// Insert a new record; fails with `DuplicateKey` if one already exists.
    async fn record(&self, record: ArtifactRecord) -> Result<(), IndexError>;
}
