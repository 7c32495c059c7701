//! Artifact record: a completed, published output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;

/// A published artifact. At most one exists per fingerprint; never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub fingerprint: Fingerprint,

    /// Durable location (URL) returned by the object store.
    pub published_location: String,

    pub completed_at: DateTime<Utc>,
}

impl ArtifactRecord {
    pub fn new(
        fingerprint: Fingerprint,
        published_location: impl Into<String>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            fingerprint,
            published_location: published_location.into(),
            completed_at,
        }
    }
}
