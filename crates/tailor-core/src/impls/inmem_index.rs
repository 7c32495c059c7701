//! InMemoryArtifactIndex - プロセス内の成果物インデックス
//!
//! 単一プロセス構成とテスト用。再起動で消える。
//! 複数プロセスで共有するなら FsArtifactIndex（または共有 KV ストア）を使う。

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ArtifactRecord, Fingerprint, IndexError};
use crate::ports::{ArtifactIndex, Lookup};

/// fingerprint -> record. `record` is check-and-insert under a single lock.
#[derive(Default)]
pub struct InMemoryArtifactIndex {
    records: Mutex<HashMap<Fingerprint, ArtifactRecord>>,
}

impl InMemoryArtifactIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl ArtifactIndex for InMemoryArtifactIndex {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Lookup, IndexError> {
        let records = self.records.lock().await;
        Ok(match records.get(fingerprint) {
            Some(record) => Lookup::Found(record.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn record(&self, record: ArtifactRecord) -> Result<(), IndexError> {
        let mut records = self.records.lock().await;
        match records.entry(record.fingerprint.clone()) {
            Entry::Occupied(existing) => Err(IndexError::DuplicateKey(existing.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn record_for(url: &str, location: &str) -> ArtifactRecord {
        ArtifactRecord::new(Fingerprint::derive(url, 100, 80), location, Utc::now())
    }

    #[tokio::test]
    async fn lookup_after_record_finds_it() {
        let index = InMemoryArtifactIndex::new();
        let record = record_for("http://host/cat.jpg", "https://cdn/cat");

        assert_eq!(index.lookup(&record.fingerprint).await.unwrap(), Lookup::NotFound);
        index.record(record.clone()).await.unwrap();
        assert_eq!(
            index.lookup(&record.fingerprint).await.unwrap(),
            Lookup::Found(record)
        );
    }

    #[tokio::test]
    async fn second_record_is_duplicate_and_does_not_overwrite() {
        let index = InMemoryArtifactIndex::new();
        let first = record_for("http://host/cat.jpg", "https://cdn/first");
        let second = record_for("http://host/cat.jpg", "https://cdn/second");

        index.record(first.clone()).await.unwrap();
        let err = index.record(second).await.unwrap_err();
        assert!(matches!(err, IndexError::DuplicateKey(ref fp) if *fp == first.fingerprint));

        let found = index.lookup(&first.fingerprint).await.unwrap().found().unwrap();
        assert_eq!(found.published_location, "https://cdn/first");
    }

    #[tokio::test]
    async fn concurrent_records_yield_exactly_one_winner() {
        let index = Arc::new(InMemoryArtifactIndex::new());
        let mut joins = Vec::new();
        for i in 0..16 {
            let index = Arc::clone(&index);
            joins.push(tokio::spawn(async move {
                index
                    .record(record_for("http://host/cat.jpg", &format!("loc-{i}")))
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for join in joins {
            if join.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(index.len().await, 1);
    }
}
