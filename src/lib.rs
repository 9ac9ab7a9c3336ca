//! # docconv
//!
//! Convert office documents, HTML and images into a target format by driving
//! external converters (LibreOffice, pandoc, wkhtmltopdf, Tesseract) through
//! a prioritised fallback chain.
//!
//! ## Why a fallback chain?
//!
//! No single converter handles every input. LibreOffice renders office files
//! faithfully but occasionally hangs or writes an empty PDF; pandoc needs a
//! LaTeX engine; wkhtmltopdf only reads HTML. Trying them in order, with a
//! hard timeout per attempt and a validation gate on every output, turns a
//! collection of unreliable tools into one dependable operation.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ConversionRequest
//!  │
//!  ├─ 1. Validate  source exists, formats differ, timeout in bounds
//!  ├─ 2. Resolve   backends accepting source and producing target
//!  ├─ 3. Fallback  availability filter, then priority order:
//!  │                 invoke (hard kill on timeout) ─▶ validate (magic, size)
//!  └─ 4. Publish   unique file in the output directory + attempt log
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docconv::{ConversionConfig, ConversionRequest, ConverterSettings, DocumentFormat, JobRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let runner = JobRunner::new(config, ConverterSettings::default().backend_set()?);
//!     let request = ConversionRequest::for_file("report.docx", DocumentFormat::Pdf, 60)?;
//!     let output = runner.convert(&request).await?;
//!     println!("{} ({} bytes) via {}", output.output_path.display(), output.size_bytes, output.backend);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docconv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AvailabilitySpec, BackendSpec, ConversionConfig, ConversionConfigBuilder, ConverterSettings,
};
pub use convert::{BackendStatus, JobRunner};
pub use error::{AttemptError, ConvertError, ErrorKind};
pub use format::DocumentFormat;
pub use output::{
    AttemptOutcome, ConversionAttempt, ConversionOutput, ConversionResult, ConversionStats,
};
pub use pipeline::backend::{
    AvailabilityCheck, BackendDescriptor, BackendSet, CommandTemplate, OutputTarget,
};
pub use pipeline::validate::{ValidationError, ValidationResult, ValidationRules, Validator};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use request::ConversionRequest;
