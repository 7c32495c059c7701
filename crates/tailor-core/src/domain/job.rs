//! Resize job: one admitted request travelling through the pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::fingerprint::{Fingerprint, extension_of};
use super::ids::JobId;

/// A work item representing one resize request.
///
/// Design:
/// - Built once at admission; all derived fields are computed in `new`.
/// - Immutable afterwards (no setters). Stages take it by reference and the
///   worker owns it until the job finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeJob {
    job_id: JobId,
    source_url: String,
    width: u32,
    /// Part of the cache key only; the resize law recomputes height from width.
    height: u32,
    fingerprint: Fingerprint,
    extension: String,
}

impl ResizeJob {
    pub fn new(source_url: impl Into<String>, width: u32, height: u32) -> Self {
        let source_url = source_url.into();
        let fingerprint = Fingerprint::derive(&source_url, width, height);
        let extension = extension_of(&source_url);
        Self {
            job_id: JobId::generate(),
            source_url,
            width,
            height,
            fingerprint,
            extension,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `<fingerprint><extension>`: name of the fetched original.
    pub fn local_file_name(&self) -> String {
        format!("{}{}", self.fingerprint, self.extension)
    }

    /// `<fingerprint>_r<extension>`: name of the resized output.
    pub fn resized_file_name(&self) -> String {
        format!("{}_r{}", self.fingerprint, self.extension)
    }

    pub fn original_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(self.local_file_name())
    }

    pub fn resized_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(self.resized_file_name())
    }

    /// Deterministic storage key: `<prefix>/<local_file_name>`.
    pub fn publish_key(&self, key_prefix: &str) -> String {
        let prefix = key_prefix.trim_matches('/');
        if prefix.is_empty() {
            self.local_file_name()
        } else {
            format!("{prefix}/{}", self.local_file_name())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn derived_names_follow_fingerprint() {
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);
        let fp = Fingerprint::derive("http://host/cat.jpg", 100, 80);

        assert_eq!(job.fingerprint(), &fp);
        assert_eq!(job.extension(), ".jpg");
        assert_eq!(job.local_file_name(), format!("{fp}.jpg"));
        assert_eq!(job.resized_file_name(), format!("{fp}_r.jpg"));
    }

    #[test]
    fn identical_inputs_share_identifiers_but_not_job_ids() {
        let a = ResizeJob::new("http://host/cat.jpg", 100, 80);
        let b = ResizeJob::new("http://host/cat.jpg", 100, 80);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.local_file_name(), b.local_file_name());
        assert_ne!(a.job_id(), b.job_id());
    }

    #[rstest]
    #[case("images", "images/")]
    #[case("/images/", "images/")]
    #[case("a/b", "a/b/")]
    #[case("", "")]
    fn publish_key_prefix(#[case] prefix: &str, #[case] expected_prefix: &str) {
        let job = ResizeJob::new("http://host/cat.jpg", 100, 80);
        assert_eq!(
            job.publish_key(prefix),
            format!("{expected_prefix}{}", job.local_file_name())
        );
    }

    #[test]
    fn paths_live_in_work_dir() {
        let job = ResizeJob::new("http://host/cat.png", 10, 10);
        let dir = Path::new("/tmp/work");
        assert_eq!(job.original_path(dir), dir.join(job.local_file_name()));
        assert_eq!(job.resized_path(dir), dir.join(job.resized_file_name()));
    }
}
