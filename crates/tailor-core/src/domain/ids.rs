//! Job identifiers.
//!
//! # ULID ベースの ID
//! - **時刻でソート可能**: 生成順にログを並べられる
//! - **分散生成可能**: 複数プロセスで調整なしに生成できる
//!
//! JobId はログの相関用で、重複排除には使わない（それは Fingerprint の役割）。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of one admitted resize job (one pass through the pipeline).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Ulid);

impl JobId {
    /// Fresh id using the current wall clock.
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_has_job_prefix() {
        let id = JobId::generate();
        assert!(id.to_string().starts_with("job-"));
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = JobId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = JobId::generate();

        assert!(id1 < id2);
    }

    #[test]
    fn from_trait_works() {
        let ulid = Ulid::new();
        let id: JobId = ulid.into();
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn same_size_as_ulid() {
        assert_eq!(std::mem::size_of::<JobId>(), std::mem::size_of::<Ulid>());
    }
}
