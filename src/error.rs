//! Error types for the docconv library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal**: the job produced no artifact (invalid
//!   request, nothing installed, every backend failed, broken configuration).
//!   Returned as `Err(ConvertError)` from [`crate::convert::JobRunner::convert`].
//!
//! * [`AttemptError`] — **Non-fatal**: one backend failed, but the chain moves
//!   on to the next one. Stored inside [`crate::output::AttemptOutcome`] so the
//!   attempt log explains exactly why every backend was rejected.
//!
//! Operators usually care about the five-way taxonomy rather than the exact
//! variant; see [`ErrorKind`].

use crate::format::DocumentFormat;
use crate::output::ConversionAttempt;
use crate::pipeline::validate::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docconv library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request failed validation; no backend was invoked.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// No configured backend is installed or usable for this conversion.
    #[error(
        "No backend available to convert {source_format} to {target_format}.\n\
Install LibreOffice (or pandoc / wkhtmltopdf / tesseract) or check the backend configuration."
    )]
    NoBackendAvailable {
        source_format: DocumentFormat,
        target_format: DocumentFormat,
    },

    /// Every available backend was tried and none produced a valid file.
    #[error("All {} backend(s) failed: {}", .attempts.len(), summarize(.attempts))]
    AllBackendsFailed { attempts: Vec<ConversionAttempt> },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or backend configuration validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backend configuration file could not be read or parsed.
    #[error("Failed to load backend configuration '{path}': {detail}")]
    ConfigRead { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Scratch or output directory could not be prepared, or the artifact
    /// could not be published.
    #[error("Workspace error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// The ordered attempt log, when the error carries one.
    pub fn attempts(&self) -> &[ConversionAttempt] {
        match self {
            ConvertError::AllBackendsFailed { attempts } => attempts,
            _ => &[],
        }
    }

    /// Taxonomy bucket for the API layer.
    ///
    /// `AllBackendsFailed` reports the kind of its last attempt, which is what
    /// the final fallback actually died of.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ConvertError::NoBackendAvailable { .. } => ErrorKind::NoBackendAvailable,
            ConvertError::AllBackendsFailed { attempts } => attempts
                .last()
                .and_then(|a| a.outcome.kind())
                .unwrap_or(ErrorKind::BackendFailure),
            _ => ErrorKind::BackendFailure,
        }
    }
}

fn summarize(attempts: &[ConversionAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.backend, a.outcome))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A non-fatal error for a single backend attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AttemptError {
    /// The process ran and exited unsuccessfully (non-zero or killed by a signal).
    #[error("exited with {}: {stderr}", exit_label(.exit_code))]
    BackendFailure {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The process could not be started even though it looked available.
    #[error("failed to start: {detail}")]
    SpawnFailed { detail: String },

    /// The process exited successfully but left no file where expected.
    #[error("exited successfully but produced no output at '{expected}'")]
    OutputMissing { expected: PathBuf },

    /// The produced file was rejected by the validator.
    #[error("validation failed: {0}")]
    ValidationFailed(ValidationError),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

impl AttemptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttemptError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            _ => ErrorKind::BackendFailure,
        }
    }
}

/// The flat error taxonomy surfaced to operators and API layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoBackendAvailable,
    BackendFailure,
    BackendTimedOut,
    ValidationFailed,
    InvalidRequest,
}
