//! Document formats understood by the pipeline.
//!
//! A [`DocumentFormat`] names both what a request starts from and what it
//! wants to end up with. Backends declare which formats they accept and the
//! single format they produce; the validator looks up magic signatures by
//! format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A document format, identified by its canonical file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
    Odt,
    Rtf,
    Html,
    Markdown,
    Txt,
    Png,
    Jpeg,
    Tiff,
}

impl DocumentFormat {
    /// Every format, in declaration order.
    pub const ALL: [DocumentFormat; 11] = [
        DocumentFormat::Pdf,
        DocumentFormat::Docx,
        DocumentFormat::Doc,
        DocumentFormat::Odt,
        DocumentFormat::Rtf,
        DocumentFormat::Html,
        DocumentFormat::Markdown,
        DocumentFormat::Txt,
        DocumentFormat::Png,
        DocumentFormat::Jpeg,
        DocumentFormat::Tiff,
    ];

    /// Canonical extension (no leading dot) used for produced files.
    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Doc => "doc",
            DocumentFormat::Odt => "odt",
            DocumentFormat::Rtf => "rtf",
            DocumentFormat::Html => "html",
            DocumentFormat::Markdown => "md",
            DocumentFormat::Txt => "txt",
            DocumentFormat::Png => "png",
            DocumentFormat::Jpeg => "jpg",
            DocumentFormat::Tiff => "tiff",
        }
    }

    /// Parse a file extension (case-insensitive, leading dot optional).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        let format = match ext.as_str() {
            "pdf" => DocumentFormat::Pdf,
            "docx" => DocumentFormat::Docx,
            "doc" => DocumentFormat::Doc,
            "odt" => DocumentFormat::Odt,
            "rtf" => DocumentFormat::Rtf,
            "html" | "htm" => DocumentFormat::Html,
            "md" | "markdown" => DocumentFormat::Markdown,
            "txt" | "text" => DocumentFormat::Txt,
            "png" => DocumentFormat::Png,
            "jpg" | "jpeg" => DocumentFormat::Jpeg,
            "tif" | "tiff" => DocumentFormat::Tiff,
            _ => return None,
        };
        Some(format)
    }

    /// Infer the format of a file from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Built-in magic signatures. Any one matching prefix is accepted.
    ///
    /// Text-like formats have no reliable signature and return an empty slice,
    /// which makes the validator skip the signature check for them.
    pub fn default_signatures(self) -> &'static [&'static [u8]] {
        match self {
            DocumentFormat::Pdf => &[b"%PDF-"],
            DocumentFormat::Docx | DocumentFormat::Odt => &[b"PK\x03\x04"],
            DocumentFormat::Doc => &[b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1"],
            DocumentFormat::Rtf => &[b"{\\rtf"],
            DocumentFormat::Png => &[b"\x89PNG\r\n\x1a\n"],
            DocumentFormat::Jpeg => &[b"\xFF\xD8\xFF"],
            DocumentFormat::Tiff => &[b"II*\x00", b"MM\x00*"],
            DocumentFormat::Html | DocumentFormat::Markdown | DocumentFormat::Txt => &[],
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("unrecognised document format '{s}'"))
    }
}
