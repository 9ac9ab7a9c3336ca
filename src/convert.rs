//! The job runner: public conversion entry points.
//!
//! A [`JobRunner`] owns the configuration and the backend set loaded at
//! startup. Each call to [`JobRunner::convert`] is one independent job:
//!
//! ```text
//! validate request ─▶ resolve backends ─▶ scratch dir ─▶ fallback chain ─▶ publish
//!      │ InvalidRequest      (accepts/produces,             (per attempt:        (unique name
//!      ▼                      priority order)                invoke + validate)   in output_dir)
//! ```
//!
//! The runner is cheap to clone and safe to share across tasks; concurrent
//! jobs never share a scratch directory or an output path.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::format::DocumentFormat;
use crate::output::ConversionResult;
use crate::pipeline::backend::BackendSet;
use crate::pipeline::fallback::FallbackChain;
use crate::pipeline::validate::Validator;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::request::ConversionRequest;
use crate::workspace::{self, JobWorkspace};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Availability report for one configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub name: String,
    pub priority: i32,
    pub program: String,
    /// Empty means any source format.
    pub accepts: Vec<DocumentFormat>,
    pub produces: DocumentFormat,
    pub available: bool,
}

struct Inner {
    config: ConversionConfig,
    backends: BackendSet,
    chain: FallbackChain,
    progress: ProgressCallback,
}

/// Runs conversion jobs against a fixed configuration and backend set.
///
/// # Example
/// ```rust,no_run
/// use docconv::{ConversionConfig, ConversionRequest, ConverterSettings, DocumentFormat, JobRunner};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::builder().output_dir("/tmp/out").build()?;
/// let runner = JobRunner::new(config, ConverterSettings::default().backend_set()?);
///
/// let request = ConversionRequest::for_file("contract.docx", DocumentFormat::Pdf, 60)?;
/// match runner.convert(&request).await {
///     Ok(out) => println!("{} via {}", out.output_path.display(), out.backend),
///     Err(e) => {
///         for a in e.attempts() {
///             eprintln!("{}: {}", a.backend, a.outcome);
///         }
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

impl JobRunner {
    pub fn new(config: ConversionConfig, backends: BackendSet) -> Self {
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let chain = FallbackChain::new(
            Validator::new(config.validation.clone()),
            config.invoke_limits(),
        )
        .with_progress(progress.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                backends,
                chain,
                progress,
            }),
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.inner.config
    }

    pub fn backends(&self) -> &BackendSet {
        &self.inner.backends
    }

    /// Build a request for `source` using the configured default timeout.
    pub fn request_for(
        &self,
        source: impl Into<PathBuf>,
        target: DocumentFormat,
    ) -> Result<ConversionRequest, ConvertError> {
        ConversionRequest::for_file(source, target, self.inner.config.default_timeout_secs)
    }

    /// Convert one document.
    ///
    /// On success the artifact has been published into the configured output
    /// directory under a unique name; the caller owns it from then on.
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionResult {
        let start = Instant::now();
        let result = self.run_job(request).await;
        let succeeded = result.is_ok();
        if !matches!(result, Err(ConvertError::InvalidRequest(_))) {
            self.inner
                .progress
                .on_job_complete(request.source_path(), succeeded);
        }
        match result {
            Ok(mut output) => {
                output.stats.total_duration_ms = start.elapsed().as_millis() as u64;
                info!(
                    "Converted {} -> {} via '{}' in {}ms",
                    request.source_path().display(),
                    output.output_path.display(),
                    output.backend,
                    output.stats.total_duration_ms
                );
                Ok(output)
            }
            Err(e) => {
                warn!("Conversion of {} failed: {}", request.source_path().display(), e);
                Err(e)
            }
        }
    }

    async fn run_job(&self, request: &ConversionRequest) -> ConversionResult {
        let inner = &self.inner;

        // ── Step 1: Validate request ─────────────────────────────────────
        request.validate(inner.config.max_timeout_secs)?;

        // ── Step 2: Resolve backends ─────────────────────────────────────
        let backends = inner
            .backends
            .routes(request.source_format(), request.target_format());
        info!(
            "Converting {} ({} -> {}), {} candidate backend(s)",
            request.source_path().display(),
            request.source_format(),
            request.target_format(),
            backends.len()
        );
        inner
            .progress
            .on_job_start(request.source_path(), backends.len());

        // ── Step 3: Run the chain in a private scratch directory ─────────
        let job = JobWorkspace::create(&inner.config.work_dir()).await?;
        let mut output = inner.chain.run(request, &backends, job.path()).await?;

        // ── Step 4: Publish ──────────────────────────────────────────────
        output.output_path = workspace::publish(
            &output.output_path,
            &inner.config.output_dir,
            &request.output_stem(),
            output.format,
        )
        .await?;
        Ok(output)
    }

    /// Convert and move the result to `dest` atomically.
    ///
    /// The artifact is first published next to `dest`, then renamed onto it,
    /// so readers of `dest` never observe a partial file. If the move fails
    /// the published artifact and any temporary copy are removed.
    pub async fn convert_to_file(
        &self,
        request: &ConversionRequest,
        dest: impl AsRef<Path>,
    ) -> ConversionResult {
        let mut output = self.convert(request).await?;
        let dest = dest.as_ref();
        let tmp = dest.with_extension(format!("{}.tmp", output.format.extension()));

        if let Err(source) = move_into_place(&output.output_path, &tmp, dest).await {
            remove_quietly(&output.output_path).await;
            remove_quietly(&tmp).await;
            return Err(ConvertError::Workspace {
                path: dest.to_path_buf(),
                source,
            });
        }
        output.output_path = dest.to_path_buf();
        Ok(output)
    }

    /// Convert document bytes held in memory.
    ///
    /// The bytes are written to a managed temporary file inside the work
    /// directory and removed once the job ends.
    pub async fn convert_from_bytes(
        &self,
        bytes: &[u8],
        source_format: DocumentFormat,
        target_format: DocumentFormat,
        timeout_secs: u64,
    ) -> ConversionResult {
        let work_dir = self.inner.config.work_dir();
        let workspace_err = |source| ConvertError::Workspace {
            path: work_dir.clone(),
            source,
        };
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(workspace_err)?;
        let dir = work_dir.clone();
        let suffix = format!(".{}", source_format.extension());
        let tmp = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("upload-")
                .suffix(&suffix)
                .tempfile_in(&dir)
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("upload task failed: {e}")))?
        .map_err(workspace_err)?;
        tokio::fs::write(tmp.path(), bytes)
            .await
            .map_err(workspace_err)?;

        let request = ConversionRequest::new(tmp.path(), source_format, target_format, timeout_secs);
        self.convert(&request).await
    }

    /// Convert several independent documents concurrently.
    ///
    /// At most `config.concurrency` jobs run at once. Results come back in
    /// the order of `requests`.
    pub async fn convert_many(&self, requests: Vec<ConversionRequest>) -> Vec<ConversionResult> {
        let concurrency = self.inner.config.concurrency.max(1);
        let mut indexed: Vec<(usize, ConversionResult)> =
            stream::iter(requests.into_iter().enumerate().map(|(idx, request)| {
                let runner = self.clone();
                async move { (idx, runner.convert(&request).await) }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, result)| result).collect()
    }

    /// Check every configured backend's availability.
    pub async fn available_backends(&self) -> Vec<BackendStatus> {
        let mut report = Vec::with_capacity(self.inner.backends.len());
        for b in self.inner.backends.iter() {
            report.push(BackendStatus {
                name: b.name.clone(),
                priority: b.priority,
                program: b.command.program(),
                accepts: b.accepts.clone(),
                produces: b.produces,
                available: b.is_available().await,
            });
        }
        report.sort_by_key(|s| s.priority);
        report
    }

    /// Synchronous wrapper around [`JobRunner::convert`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn convert_sync(&self, request: &ConversionRequest) -> ConversionResult {
        tokio::runtime::Runtime::new()
            .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.convert(request))
    }
}

/// Rename `from` onto `dest`; across filesystems, copy to `tmp` first.
async fn move_into_place(from: &Path, tmp: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(from, dest).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, tmp).await?;
    tokio::fs::rename(tmp, dest).await?;
    remove_quietly(from).await;
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("could not remove '{}': {}", path.display(), e);
        }
    }
}
