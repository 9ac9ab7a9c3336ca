//! Result types: the published artifact and the per-backend attempt log.

use crate::error::{AttemptError, ConvertError, ErrorKind};
use crate::format::DocumentFormat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Outcome of a conversion job: the validated artifact, or a fatal error
/// carrying the ordered attempt log.
pub type ConversionResult = Result<ConversionOutput, ConvertError>;

/// A successfully converted and validated document.
///
/// The caller owns `output_path` and is responsible for deleting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Unique path of the published artifact.
    pub output_path: PathBuf,
    /// Size in bytes, as measured by the validator.
    pub size_bytes: u64,
    /// Format of the artifact.
    pub format: DocumentFormat,
    /// Name of the backend whose output was accepted.
    pub backend: String,
    /// Every attempt made, in priority order; the last one is the success.
    pub attempts: Vec<ConversionAttempt>,
    pub stats: ConversionStats,
}

/// Timing and counting statistics for one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Backends that passed their availability check.
    pub available_backends: usize,
    /// Backends skipped as unavailable (never attempted).
    pub skipped_backends: usize,
    /// Attempts that failed before the successful one.
    pub failed_attempts: usize,
    /// Wall-clock time of the whole job.
    pub total_duration_ms: u64,
}

/// One backend invocation, as recorded in the attempt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionAttempt {
    /// Backend name (unique within a configuration).
    pub backend: String,
    pub priority: i32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure(AttemptError),
    TimedOut,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }

    /// Taxonomy bucket, or `None` for a successful attempt.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AttemptOutcome::Success => None,
            AttemptOutcome::Failure(e) => Some(e.kind()),
            AttemptOutcome::TimedOut => Some(ErrorKind::BackendTimedOut),
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("success"),
            AttemptOutcome::Failure(e) => write!(f, "{e}"),
            AttemptOutcome::TimedOut => f.write_str("timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::validate::ValidationError;

    #[test]
    fn outcome_serialises_with_status_tag() {
        let outcome = AttemptOutcome::Failure(AttemptError::ValidationFailed(
            ValidationError::Empty,
        ));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failure");
        assert!(json["reason"].is_object());

        let timed_out = serde_json::to_value(AttemptOutcome::TimedOut).unwrap();
        assert_eq!(timed_out["status"], "timed_out");
    }

    #[test]
    fn outcome_kinds() {
        assert_eq!(AttemptOutcome::Success.kind(), None);
        assert_eq!(
            AttemptOutcome::TimedOut.kind(),
            Some(ErrorKind::BackendTimedOut)
        );
        assert_eq!(
            AttemptOutcome::Failure(AttemptError::ValidationFailed(ValidationError::Empty)).kind(),
            Some(ErrorKind::ValidationFailed)
        );
    }
}
