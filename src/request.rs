//! Conversion requests and their up-front validation.

use crate::error::ConvertError;
use crate::format::DocumentFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest sanitised stem used when naming produced files.
const MAX_STEM_LEN: usize = 100;

/// One unit of work: convert `source_path` from `source_format` into
/// `target_format`, giving each backend at most `timeout_secs`.
///
/// Requests are immutable once built. Field checks that need the filesystem
/// happen when the job runs, not at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    source_path: PathBuf,
    source_format: DocumentFormat,
    target_format: DocumentFormat,
    timeout_secs: u64,
}

impl ConversionRequest {
    pub fn new(
        source_path: impl Into<PathBuf>,
        source_format: DocumentFormat,
        target_format: DocumentFormat,
        timeout_secs: u64,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            source_format,
            target_format,
            timeout_secs,
        }
    }

    /// Build a request, inferring the source format from the file extension.
    pub fn for_file(
        source_path: impl Into<PathBuf>,
        target_format: DocumentFormat,
        timeout_secs: u64,
    ) -> Result<Self, ConvertError> {
        let source_path = source_path.into();
        let source_format = DocumentFormat::from_path(&source_path).ok_or_else(|| {
            ConvertError::InvalidRequest(format!(
                "cannot infer document format of '{}' from its extension",
                source_path.display()
            ))
        })?;
        Ok(Self::new(source_path, source_format, target_format, timeout_secs))
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn source_format(&self) -> DocumentFormat {
        self.source_format
    }

    pub fn target_format(&self) -> DocumentFormat {
        self.target_format
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Filesystem-safe stem of the source file name, used to name outputs.
    ///
    /// Characters outside `[A-Za-z0-9._-]` become `_`; an empty result
    /// falls back to `document`.
    pub fn output_stem(&self) -> String {
        let raw = self
            .source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let cleaned: String = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_STEM_LEN)
            .collect();
        let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_').to_string();
        if cleaned.is_empty() {
            "document".to_string()
        } else {
            cleaned
        }
    }

    /// Reject requests that cannot possibly succeed, before any backend runs.
    pub fn validate(&self, max_timeout_secs: u64) -> Result<(), ConvertError> {
        if self.timeout_secs == 0 {
            return Err(ConvertError::InvalidRequest(
                "timeout must be at least 1 second".into(),
            ));
        }
        if self.timeout_secs > max_timeout_secs {
            return Err(ConvertError::InvalidRequest(format!(
                "timeout {}s exceeds the maximum of {}s",
                self.timeout_secs, max_timeout_secs
            )));
        }
        if self.source_format == self.target_format {
            return Err(ConvertError::InvalidRequest(format!(
                "source and target format are both {}",
                self.source_format
            )));
        }

        let path = &self.source_path;
        let meta = std::fs::metadata(path).map_err(|e| {
            ConvertError::InvalidRequest(format!("source '{}': {}", path.display(), e))
        })?;
        if !meta.is_file() {
            return Err(ConvertError::InvalidRequest(format!(
                "source '{}' is not a regular file",
                path.display()
            )));
        }
        if meta.len() == 0 {
            return Err(ConvertError::InvalidRequest(format!(
                "source '{}' is empty",
                path.display()
            )));
        }
        std::fs::File::open(path).map_err(|e| {
            ConvertError::InvalidRequest(format!(
                "source '{}' is not readable: {}",
                path.display(),
                e
            ))
        })?;
        Ok(())
    }
}
