//! Progress-callback trait for per-job and per-attempt events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to follow a
//! job as it walks the fallback chain: which backends were skipped, which
//! were tried, and how each attempt ended.
//!
//! # Example
//!
//! ```rust
//! use docconv::{ConversionAttempt, ConversionConfig, ConversionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct FailureCounter {
//!     failed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for FailureCounter {
//!     fn on_attempt_complete(&self, attempt: &ConversionAttempt) {
//!         if !attempt.outcome.is_success() {
//!             self.failed.fetch_add(1, Ordering::SeqCst);
//!             eprintln!("{} failed: {}", attempt.backend, attempt.outcome);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(FailureCounter { failed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ConversionAttempt;
use std::path::Path;
use std::sync::Arc;

/// Called by the job runner and fallback chain as a job progresses.
///
/// Implementations must be `Send + Sync`: with
/// [`crate::convert::JobRunner::convert_many`] several jobs report through
/// the same callback concurrently. All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// A validated job is about to walk its chain.
    ///
    /// # Arguments
    /// * `source`     — the file being converted
    /// * `candidates` — backends that handle this format pair, before availability checks
    fn on_job_start(&self, source: &Path, candidates: usize) {
        let _ = (source, candidates);
    }

    /// A backend failed its availability check and will not be attempted.
    fn on_backend_skipped(&self, backend: &str) {
        let _ = backend;
    }

    /// A backend is about to be invoked.
    ///
    /// # Arguments
    /// * `attempt`   — 1-indexed position among available backends
    /// * `available` — number of available backends for this job
    fn on_attempt_start(&self, backend: &str, attempt: usize, available: usize) {
        let _ = (backend, attempt, available);
    }

    /// An attempt has finished; `attempt.outcome` says how.
    fn on_attempt_complete(&self, attempt: &ConversionAttempt) {
        let _ = attempt;
    }

    /// The job has finished, successfully or not.
    fn on_job_complete(&self, source: &Path, succeeded: bool) {
        let _ = (source, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::AttemptOutcome;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        skipped: AtomicUsize,
        starts: AtomicUsize,
        failures: AtomicUsize,
        jobs_ok: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_backend_skipped(&self, _backend: &str) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }

        fn on_attempt_start(&self, _backend: &str, _attempt: usize, _available: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_attempt_complete(&self, attempt: &ConversionAttempt) {
            if !attempt.outcome.is_success() {
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_job_complete(&self, _source: &Path, succeeded: bool) {
            if succeeded {
                self.jobs_ok.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn attempt(outcome: AttemptOutcome) -> ConversionAttempt {
        ConversionAttempt {
            backend: "libreoffice".into(),
            priority: 10,
            started_at: Utc::now(),
            duration_ms: 5,
            outcome,
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_job_start(Path::new("a.docx"), 2);
        cb.on_backend_skipped("pandoc");
        cb.on_attempt_start("libreoffice", 1, 1);
        cb.on_attempt_complete(&attempt(AttemptOutcome::Success));
        cb.on_job_complete(Path::new("a.docx"), true);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_backend_skipped("pandoc");
        tracker.on_attempt_start("libreoffice", 1, 2);
        tracker.on_attempt_complete(&attempt(AttemptOutcome::TimedOut));
        tracker.on_attempt_start("wkhtmltopdf", 2, 2);
        tracker.on_attempt_complete(&attempt(AttemptOutcome::Success));
        tracker.on_job_complete(Path::new("a.docx"), true);

        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.jobs_ok.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_job_start(Path::new("scan.png"), 1);
        cb.on_job_complete(Path::new("scan.png"), false);
    }
}
