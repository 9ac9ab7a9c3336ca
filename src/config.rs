//! Configuration types for document conversion.
//!
//! Two layers:
//!
//! * [`ConversionConfig`], built via [`ConversionConfigBuilder`], holds the
//!   per-runner knobs: where outputs go, timeout bounds, validation rules,
//!   concurrency, progress reporting.
//! * [`ConverterSettings`] is the serialisable backend configuration,
//!   loaded once at startup from JSON (or taken from
//!   [`ConverterSettings::default`], which ships the built-in chain) and
//!   turned into a [`BackendSet`].

use crate::error::ConvertError;
use crate::format::DocumentFormat;
use crate::pipeline::backend::{
    AvailabilityCheck, BackendDescriptor, BackendSet, CommandTemplate, InvokeLimits, OutputTarget,
};
use crate::pipeline::validate::ValidationRules;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a [`crate::convert::JobRunner`].
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use docconv::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .output_dir("/var/lib/docconv/out")
///     .default_timeout_secs(90)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Directory published artifacts land in. Default: `<tmp>/docconv`.
    pub output_dir: PathBuf,

    /// Parent of per-job scratch directories. Default: `<output_dir>/.work`.
    ///
    /// Keeping it on the same filesystem as `output_dir` makes publication a
    /// rename rather than a copy.
    pub work_dir: Option<PathBuf>,

    /// Timeout used when a caller does not pick one. Default: 60.
    pub default_timeout_secs: u64,

    /// Largest per-backend timeout a request may ask for. Default: 600.
    pub max_timeout_secs: u64,

    /// Output acceptance rules.
    pub validation: ValidationRules,

    /// Stderr kept per attempt for the log. Default: 8 KiB.
    pub max_stderr_bytes: usize,

    /// How long to wait for a killed backend's pipes to close. Default: 1000 ms.
    pub kill_grace_ms: u64,

    /// Jobs run at once by `convert_many`. Default: 4.
    ///
    /// Office converters are CPU- and memory-heavy; a handful of parallel
    /// LibreOffice instances saturates a typical server.
    pub concurrency: usize,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir().join("docconv"),
            work_dir: None,
            default_timeout_secs: 60,
            max_timeout_secs: 600,
            validation: ValidationRules::default(),
            max_stderr_bytes: 8 * 1024,
            kill_grace_ms: 1000,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_dir", &self.output_dir)
            .field("work_dir", &self.work_dir)
            .field("default_timeout_secs", &self.default_timeout_secs)
            .field("max_timeout_secs", &self.max_timeout_secs)
            .field("validation", &self.validation)
            .field("max_stderr_bytes", &self.max_stderr_bytes)
            .field("kill_grace_ms", &self.kill_grace_ms)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective scratch root.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join(".work"))
    }

    pub(crate) fn invoke_limits(&self) -> InvokeLimits {
        InvokeLimits {
            max_stderr_bytes: self.max_stderr_bytes,
            kill_grace: Duration::from_millis(self.kill_grace_ms),
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn default_timeout_secs(mut self, secs: u64) -> Self {
        self.config.default_timeout_secs = secs;
        self
    }

    pub fn max_timeout_secs(mut self, secs: u64) -> Self {
        self.config.max_timeout_secs = secs;
        self
    }

    pub fn validation(mut self, rules: ValidationRules) -> Self {
        self.config.validation = rules;
        self
    }

    pub fn min_size_bytes(mut self, bytes: u64) -> Self {
        self.config.validation.min_size_bytes = bytes;
        self
    }

    pub fn max_stderr_bytes(mut self, bytes: usize) -> Self {
        self.config.max_stderr_bytes = bytes;
        self
    }

    pub fn kill_grace_ms(mut self, ms: u64) -> Self {
        self.config.kill_grace_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.output_dir.as_os_str().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "output directory must not be empty".into(),
            ));
        }
        if c.max_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "maximum timeout must be ≥ 1 second".into(),
            ));
        }
        if c.default_timeout_secs == 0 || c.default_timeout_secs > c.max_timeout_secs {
            return Err(ConvertError::InvalidConfig(format!(
                "default timeout must be 1–{}s, got {}",
                c.max_timeout_secs, c.default_timeout_secs
            )));
        }
        Ok(self.config)
    }
}

// ── Backend configuration file ───────────────────────────────────────────

/// How a [`BackendSpec`] decides whether its backend is installed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilitySpec {
    Always,
    /// Program found on `PATH`. (default)
    #[default]
    OnPath,
    /// `<program> <args>` exits 0.
    Probe {
        #[serde(default = "default_probe_args")]
        args: Vec<String>,
    },
}

fn default_probe_args() -> Vec<String> {
    vec!["--version".into()]
}

fn default_produces() -> DocumentFormat {
    DocumentFormat::Pdf
}

/// One backend as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSpec {
    pub name: String,
    pub priority: i32,
    pub program: String,
    /// Environment variable that, when set, replaces `program`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_env: Option<String>,
    /// Other names or install paths tried when `program` is not found.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_programs: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Source formats accepted. Empty means any.
    #[serde(default)]
    pub accepts: Vec<DocumentFormat>,
    #[serde(default = "default_produces")]
    pub produces: DocumentFormat,
    #[serde(default)]
    pub output: OutputTarget,
    #[serde(default)]
    pub availability: AvailabilitySpec,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl BackendSpec {
    /// Turn the file form into a runtime descriptor, checking the template.
    pub fn to_descriptor(&self) -> Result<BackendDescriptor, ConvertError> {
        let mut command = CommandTemplate::new(&self.program, self.args.iter().cloned())
            .map_err(|e| match e {
                ConvertError::InvalidConfig(msg) => {
                    ConvertError::InvalidConfig(format!("backend '{}': {msg}", self.name))
                }
                other => other,
            })?;
        if let Some(var) = &self.program_env {
            command = command.with_program_env(var);
        }
        if !self.fallback_programs.is_empty() {
            command = command.with_fallback_programs(self.fallback_programs.iter().cloned());
        }
        let availability = match &self.availability {
            AvailabilitySpec::Always => AvailabilityCheck::Always,
            AvailabilitySpec::OnPath => AvailabilityCheck::OnPath,
            AvailabilitySpec::Probe { args } => AvailabilityCheck::Probe { args: args.clone() },
        };
        let mut descriptor = BackendDescriptor::new(&self.name, self.priority, command)
            .availability(availability)
            .accepts(self.accepts.iter().copied())
            .produces(self.produces)
            .output(self.output);
        for (k, v) in &self.env {
            descriptor = descriptor.env(k, v);
        }
        Ok(descriptor)
    }
}

/// The backend configuration file: the backend list plus validation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterSettings {
    pub backends: Vec<BackendSpec>,
    #[serde(default)]
    pub validation: ValidationRules,
}

impl ConverterSettings {
    /// Parse settings from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConvertError> {
        serde_json::from_str(json)
            .map_err(|e| ConvertError::InvalidConfig(format!("backend configuration: {e}")))
    }

    /// Load settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConvertError::ConfigRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConvertError::ConfigRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Validate every backend and build the runtime set.
    pub fn backend_set(&self) -> Result<BackendSet, ConvertError> {
        let descriptors = self
            .backends
            .iter()
            .map(BackendSpec::to_descriptor)
            .collect::<Result<Vec<_>, _>>()?;
        BackendSet::new(descriptors)
    }
}

impl Default for ConverterSettings {
    /// The built-in chain: LibreOffice, then pandoc, then wkhtmltopdf for
    /// documents to PDF, and Tesseract for images to text.
    fn default() -> Self {
        use DocumentFormat::*;

        let libreoffice = BackendSpec {
            name: "libreoffice".into(),
            priority: 10,
            program: "soffice".into(),
            program_env: Some("LIBREOFFICE_PATH".into()),
            fallback_programs: [
                "libreoffice",
                "/usr/bin/soffice",
                "/usr/bin/libreoffice",
                "/opt/libreoffice/program/soffice",
                "/snap/bin/libreoffice",
            ]
            .map(String::from)
            .to_vec(),
            args: [
                "--headless",
                "--invisible",
                "--norestore",
                "--nolockcheck",
                "--nodefault",
                "--nofirststartwizard",
                "-env:UserInstallation=file://{profile_dir}",
                "--convert-to",
                "pdf:writer_pdf_Export",
                "--outdir",
                "{output_dir}",
                "{input}",
            ]
            .map(String::from)
            .to_vec(),
            accepts: vec![Docx, Doc, Odt, Rtf, Txt],
            produces: Pdf,
            output: OutputTarget::Directory,
            availability: AvailabilitySpec::Probe {
                args: default_probe_args(),
            },
            env: BTreeMap::new(),
        };

        let pandoc = BackendSpec {
            name: "pandoc".into(),
            priority: 20,
            program: "pandoc".into(),
            program_env: Some("PANDOC_PATH".into()),
            fallback_programs: Vec::new(),
            args: ["{input}", "-o", "{output}"].map(String::from).to_vec(),
            accepts: vec![Docx, Odt, Html, Markdown, Txt],
            produces: Pdf,
            output: OutputTarget::File,
            availability: AvailabilitySpec::OnPath,
            env: BTreeMap::new(),
        };

        let wkhtmltopdf = BackendSpec {
            name: "wkhtmltopdf".into(),
            priority: 30,
            program: "wkhtmltopdf".into(),
            program_env: None,
            fallback_programs: Vec::new(),
            args: ["--quiet", "{input}", "{output}"].map(String::from).to_vec(),
            accepts: vec![Html],
            produces: Pdf,
            output: OutputTarget::File,
            availability: AvailabilitySpec::OnPath,
            env: BTreeMap::new(),
        };

        let tesseract = BackendSpec {
            name: "tesseract".into(),
            priority: 10,
            program: "tesseract".into(),
            program_env: Some("TESSERACT_PATH".into()),
            fallback_programs: Vec::new(),
            args: ["{input}", "{output_stem}", "-l", "eng"]
                .map(String::from)
                .to_vec(),
            accepts: vec![Png, Jpeg, Tiff],
            produces: Txt,
            output: OutputTarget::Stem,
            availability: AvailabilitySpec::Probe {
                args: default_probe_args(),
            },
            env: BTreeMap::new(),
        };

        Self {
            backends: vec![libreoffice, pandoc, wkhtmltopdf, tesseract],
            validation: ValidationRules::default(),
        }
    }
}
