//! Outcome model: terminal result of one job.
//!
//! Not persisted. Consumed by the logging / counters / outcome sink only.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{CleanupError, ErrorKind, StageError};

/// Stages that can fail a job, in execution order. Cleanup runs after
/// them but never fails a job, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Fetch,
    Transform,
    Publish,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Transform => "transform",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a job.
///
/// - `SUCCEEDED`: the artifact is published and recorded (or was already
///   recorded by a concurrent job, `deduplicated = true`).
/// - `FAILED`: the chain stopped at `stage`; nothing was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineOutcome {
    Succeeded {
        location: String,

        #[serde(default)]
        deduplicated: bool,

        /// Cleanup never fails a job, but it must stay observable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cleanup_error: Option<String>,
    },
    Failed {
        stage: Stage,
        kind: ErrorKind,
        cause: String,
        attempts: u32,
    },
}

impl PipelineOutcome {
    pub fn succeeded(location: impl Into<String>) -> Self {
        PipelineOutcome::Succeeded {
            location: location.into(),
            deduplicated: false,
            cleanup_error: None,
        }
    }

    pub fn deduplicated(location: impl Into<String>) -> Self {
        PipelineOutcome::Succeeded {
            location: location.into(),
            deduplicated: true,
            cleanup_error: None,
        }
    }

    pub fn failed(error: &StageError, attempts: u32) -> Self {
        PipelineOutcome::Failed {
            stage: error.stage(),
            kind: error.kind(),
            cause: error.to_string(),
            attempts,
        }
    }

    /// Attach a cleanup failure to a successful outcome. No-op on failures.
    pub fn with_cleanup_error(mut self, error: &CleanupError) -> Self {
        if let PipelineOutcome::Succeeded { cleanup_error, .. } = &mut self {
            *cleanup_error = Some(error.to_string());
        }
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded { .. })
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            PipelineOutcome::Succeeded { location, .. } => Some(location),
            PipelineOutcome::Failed { .. } => None,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineOutcome::Failed { stage, .. } => Some(*stage),
            PipelineOutcome::Succeeded { .. } => None,
        }
    }
}
