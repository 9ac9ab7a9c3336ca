//! Output validation: does a produced file plausibly match its claimed format?
//!
//! External converters routinely exit 0 after writing nothing useful: an
//! empty file, an HTML error page named `.pdf`, or a one-page shell with no
//! content. The checks here run in a fixed order and the first failure wins:
//!
//! 1. exists, is a regular file, size > 0 (metadata only, nothing is read)
//! 2. leading bytes match one of the format's magic signatures
//! 3. size reaches the configured minimum
//!
//! No retries happen here; retry policy belongs to the fallback chain.

use crate::format::DocumentFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Thresholds and signatures used by the [`Validator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    /// Minimum plausible size in bytes. Default: 100.
    #[serde(default = "default_min_size")]
    pub min_size_bytes: u64,

    /// Accepted leading-byte signatures per format. A format absent from the
    /// map (or mapped to an empty list) skips the signature check.
    #[serde(default = "default_signatures")]
    pub signatures: BTreeMap<DocumentFormat, Vec<Vec<u8>>>,
}

fn default_min_size() -> u64 {
    100
}

fn default_signatures() -> BTreeMap<DocumentFormat, Vec<Vec<u8>>> {
    DocumentFormat::ALL
        .iter()
        .filter(|f| !f.default_signatures().is_empty())
        .map(|f| {
            let sigs = f.default_signatures().iter().map(|s| s.to_vec()).collect();
            (*f, sigs)
        })
        .collect()
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_size_bytes: default_min_size(),
            signatures: default_signatures(),
        }
    }
}

/// Why a produced file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("output file does not exist")]
    Missing,

    #[error("output path is not a regular file")]
    NotAFile,

    #[error("output file is empty")]
    Empty,

    #[error("leading bytes {found:02x?} do not match any {expected} signature")]
    BadSignature {
        expected: DocumentFormat,
        found: Vec<u8>,
    },

    #[error("output is suspiciously small ({size} bytes, minimum {min})")]
    TooSmall { size: u64, min: u64 },

    #[error("output could not be read: {detail}")]
    Unreadable { detail: String },
}

/// Result of validating one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid(u64),
    Invalid(ValidationError),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }
}

/// Checks produced files against a fixed set of [`ValidationRules`].
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: ValidationRules,
}

impl Validator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Validate `path` as a file of `expected` format.
    pub fn validate(&self, path: &Path, expected: DocumentFormat) -> ValidationResult {
        let meta = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ValidationResult::Invalid(ValidationError::Missing)
            }
            Err(e) => {
                return ValidationResult::Invalid(ValidationError::Unreadable {
                    detail: e.to_string(),
                })
            }
        };
        if !meta.is_file() {
            return ValidationResult::Invalid(ValidationError::NotAFile);
        }
        let size = meta.len();
        if size == 0 {
            return ValidationResult::Invalid(ValidationError::Empty);
        }

        let signatures = self
            .rules
            .signatures
            .get(&expected)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        if !signatures.is_empty() {
            let longest = signatures.iter().map(Vec::len).max().unwrap_or(0);
            let head = match read_head(path, longest) {
                Ok(h) => h,
                Err(e) => {
                    return ValidationResult::Invalid(ValidationError::Unreadable {
                        detail: e.to_string(),
                    })
                }
            };
            if !signatures.iter().any(|sig| head.starts_with(sig)) {
                return ValidationResult::Invalid(ValidationError::BadSignature {
                    expected,
                    found: head,
                });
            }
        }

        if size < self.rules.min_size_bytes {
            return ValidationResult::Invalid(ValidationError::TooSmall {
                size,
                min: self.rules.min_size_bytes,
            });
        }

        ValidationResult::Valid(size)
    }
}

/// Read up to `n` leading bytes; shorter files yield a shorter buffer.
fn read_head(path: &Path, n: usize) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(n);
    File::open(path)?.take(n as u64).read_to_end(&mut head)?;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn pdf_bytes(len: usize) -> Vec<u8> {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(len, b' ');
        bytes
    }

    #[test]
    fn accepts_plausible_pdf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        fs::write(&path, pdf_bytes(512)).unwrap();

        let result = Validator::default().validate(&path, DocumentFormat::Pdf);
        assert_eq!(result, ValidationResult::Valid(512));
    }

    #[test]
    fn missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Validator::default().validate(&dir.path().join("nope.pdf"), DocumentFormat::Pdf);
        assert_eq!(result, ValidationResult::Invalid(ValidationError::Missing));
    }

    #[test]
    fn directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        let result = Validator::default().validate(dir.path(), DocumentFormat::Pdf);
        assert_eq!(result, ValidationResult::Invalid(ValidationError::NotAFile));
    }

    #[test]
    fn zero_byte_file_is_empty_not_bad_signature() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        fs::write(&path, b"").unwrap();

        let result = Validator::default().validate(&path, DocumentFormat::Pdf);
        assert_eq!(result, ValidationResult::Invalid(ValidationError::Empty));
    }

    #[test]
    fn wrong_magic_of_correct_size_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        let mut html = b"<html><body>conversion error</body></html>".to_vec();
        html.resize(4096, b' ');
        fs::write(&path, &html).unwrap();

        match Validator::default().validate(&path, DocumentFormat::Pdf) {
            ValidationResult::Invalid(ValidationError::BadSignature { expected, found }) => {
                assert_eq!(expected, DocumentFormat::Pdf);
                assert_eq!(found, b"<html".to_vec());
            }
            other => panic!("expected BadSignature, got {other:?}"),
        }
    }

    #[test]
    fn signature_checked_before_minimum_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        fs::write(&path, b"nope").unwrap();

        let result = Validator::default().validate(&path, DocumentFormat::Pdf);
        assert!(matches!(
            result,
            ValidationResult::Invalid(ValidationError::BadSignature { .. })
        ));
    }

    #[test]
    fn tiny_shell_is_too_small() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        fs::write(&path, pdf_bytes(40)).unwrap();

        let result = Validator::default().validate(&path, DocumentFormat::Pdf);
        assert_eq!(
            result,
            ValidationResult::Invalid(ValidationError::TooSmall { size: 40, min: 100 })
        );
    }

    #[test]
    fn minimum_is_configurable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        fs::write(&path, pdf_bytes(40)).unwrap();

        let rules = ValidationRules {
            min_size_bytes: 16,
            ..ValidationRules::default()
        };
        assert!(Validator::new(rules).validate(&path, DocumentFormat::Pdf).is_valid());
    }

    #[test]
    fn text_output_skips_signature_check() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.txt");
        fs::write(&path, "x".repeat(200)).unwrap();

        assert_eq!(
            Validator::default().validate(&path, DocumentFormat::Txt),
            ValidationResult::Valid(200)
        );
    }

    #[test]
    fn tiff_accepts_either_byte_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.tiff");
        let mut bytes = b"MM\x00*".to_vec();
        bytes.resize(300, 0);
        fs::write(&path, &bytes).unwrap();

        assert!(Validator::default().validate(&path, DocumentFormat::Tiff).is_valid());
    }

    #[test]
    fn rules_deserialise_with_defaults() {
        let rules: ValidationRules = serde_json::from_str(r#"{"min_size_bytes": 2048}"#).unwrap();
        assert_eq!(rules.min_size_bytes, 2048);
        assert_eq!(rules.signatures[&DocumentFormat::Pdf], vec![b"%PDF-".to_vec()]);
    }
}
