//! Domain model (fingerprint, job, artifact, outcome, errors).
//!
//! Pure data and pure functions only: no I/O, no async.

pub mod artifact;
pub mod dimensions;
pub mod errors;
pub mod fingerprint;
pub mod ids;
pub mod job;
pub mod outcome;

pub use artifact::ArtifactRecord;
pub use dimensions::Dimensions;
pub use errors::{
    AdmissionError, CleanupError, ErrorKind, FetchError, IndexError, PublishError, StageError,
    TransformError,
};
pub use fingerprint::{FINGERPRINT_LEN, Fingerprint, extension_of};
pub use ids::JobId;
pub use job::ResizeJob;
pub use outcome::{PipelineOutcome, Stage};
