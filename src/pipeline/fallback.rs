//! The fallback chain: try each available backend in priority order until one
//! produces a file the validator accepts.
//!
//! Attempts are strictly sequential. Each one writes into its own
//! subdirectory of the job's scratch space, and a rejected attempt's output is
//! deleted before the next backend starts, so nothing half-written survives.
//! Unavailable backends are skipped silently (they appear in stats and
//! progress events, not in the attempt log).

use crate::error::{AttemptError, ConvertError};
use crate::output::{
    AttemptOutcome, ConversionAttempt, ConversionOutput, ConversionResult, ConversionStats,
};
use crate::pipeline::backend::{BackendDescriptor, InvokeLimits, RawStatus};
use crate::pipeline::validate::{ValidationResult, Validator};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::request::ConversionRequest;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one request through an ordered list of backends.
#[derive(Clone)]
pub struct FallbackChain {
    validator: Validator,
    limits: InvokeLimits,
    progress: ProgressCallback,
}

impl FallbackChain {
    pub fn new(validator: Validator, limits: InvokeLimits) -> Self {
        Self {
            validator,
            limits,
            progress: Arc::new(NoopProgressCallback),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Run `request` through `backends`, writing attempts under `job_dir`.
    ///
    /// On success `output_path` points inside `job_dir`; the caller publishes
    /// it before the scratch directory is dropped.
    pub async fn run(
        &self,
        request: &ConversionRequest,
        backends: &[BackendDescriptor],
        job_dir: &Path,
    ) -> ConversionResult {
        // ── Step 1: Order and filter by availability ─────────────────────
        let mut ordered: Vec<&BackendDescriptor> = backends.iter().collect();
        ordered.sort_by_key(|b| b.priority);

        let mut available = Vec::with_capacity(ordered.len());
        let mut skipped = 0;
        for backend in ordered {
            if backend.is_available().await {
                available.push(backend);
            } else {
                debug!("Backend '{}' unavailable, skipping", backend.name);
                skipped += 1;
                self.progress.on_backend_skipped(&backend.name);
            }
        }

        if available.is_empty() {
            warn!(
                "No backend available for {} -> {}",
                request.source_format(),
                request.target_format()
            );
            return Err(ConvertError::NoBackendAvailable {
                source_format: request.source_format(),
                target_format: request.target_format(),
            });
        }

        // ── Step 2: Try each in turn ─────────────────────────────────────
        let total = available.len();
        let stem = request.output_stem();
        let target = request.target_format();
        let mut attempts: Vec<ConversionAttempt> = Vec::with_capacity(total);

        for (idx, backend) in available.into_iter().enumerate() {
            self.progress.on_attempt_start(&backend.name, idx + 1, total);
            info!(
                "[{}/{}] Trying '{}' for {}",
                idx + 1,
                total,
                backend.name,
                request.source_path().display()
            );

            let attempt_dir = job_dir.join(&backend.name);
            let output_path = attempt_dir.join(format!("{stem}.{}", target.extension()));
            let started_at = Utc::now();

            let raw = backend.invoke(request, &output_path, &self.limits).await;

            let (outcome, size) = match raw.status {
                RawStatus::TimedOut => (AttemptOutcome::TimedOut, None),
                RawStatus::SpawnFailed { detail } => (
                    AttemptOutcome::Failure(AttemptError::SpawnFailed { detail }),
                    None,
                ),
                RawStatus::Failed { exit_code } => (
                    AttemptOutcome::Failure(AttemptError::BackendFailure {
                        exit_code,
                        stderr: raw.stderr.clone(),
                    }),
                    None,
                ),
                RawStatus::Success => match raw.output_path.as_deref() {
                    None => (
                        AttemptOutcome::Failure(AttemptError::OutputMissing {
                            expected: output_path.clone(),
                        }),
                        None,
                    ),
                    Some(produced) => match self.validator.validate(produced, target) {
                        ValidationResult::Valid(size) => (AttemptOutcome::Success, Some(size)),
                        ValidationResult::Invalid(reason) => (
                            AttemptOutcome::Failure(AttemptError::ValidationFailed(reason)),
                            None,
                        ),
                    },
                },
            };

            let attempt = ConversionAttempt {
                backend: backend.name.clone(),
                priority: backend.priority,
                started_at,
                duration_ms: raw.duration.as_millis() as u64,
                outcome,
            };
            self.progress.on_attempt_complete(&attempt);

            if let Some(size_bytes) = size {
                info!(
                    "'{}' produced {} ({} bytes) in {}ms",
                    backend.name,
                    output_path.display(),
                    size_bytes,
                    attempt.duration_ms
                );
                attempts.push(attempt);
                let failed_attempts = attempts.len() - 1;
                return Ok(ConversionOutput {
                    output_path,
                    size_bytes,
                    format: target,
                    backend: backend.name.clone(),
                    attempts,
                    stats: ConversionStats {
                        available_backends: total,
                        skipped_backends: skipped,
                        failed_attempts,
                        total_duration_ms: 0,
                    },
                });
            }

            warn!("'{}' rejected: {}", backend.name, attempt.outcome);
            if !raw.stderr.is_empty() {
                debug!("'{}' stderr: {}", backend.name, raw.stderr);
            }
            discard_attempt(&attempt_dir).await;
            attempts.push(attempt);
        }

        // ── Step 3: Exhausted ────────────────────────────────────────────
        Err(ConvertError::AllBackendsFailed { attempts })
    }
}

/// Remove everything a rejected attempt left behind.
async fn discard_attempt(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not clean '{}': {}", dir.display(), e),
    }
}
