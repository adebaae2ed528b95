//! Error types for the pdf-stitch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`StitchError`] — **Fatal** for the call that returned it: a merge that
//!   hit an unreadable PDF, a single-file conversion that could not render,
//!   a batch in which every file failed.
//!
//! * [`FileWarning`] — **Non-fatal**: one file of a multi-file conversion
//!   failed but the others went through. Stored inside
//!   [`crate::output::BatchOutput`] so callers can report partial success.
//!
//! Capability implementations ([`crate::host::RenderHost`]) report failures
//! as [`HostError`], which the pipeline wraps into [`StitchError::Host`] or
//! [`StitchError::Rasterization`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-stitch library.
#[derive(Debug, Error)]
pub enum StitchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No files were handed to a merge or batch conversion.
    #[error("No files provided")]
    NoInput,

    /// Legacy binary Word document; conversion is not attempted.
    #[error(
        "'{name}' is a legacy Word document (.doc), which cannot be converted.\n\
Convert it to DOCX first (File → Save As → Word Document) or use a desktop application."
    )]
    UnsupportedFormat { name: String },

    /// The file kind has no conversion path (e.g. a PDF handed to convert).
    #[error("Unsupported file type: '{name}'")]
    UnsupportedFileType { name: String },

    /// A non-PDF file was handed to merge.
    #[error("File '{name}' is not a PDF file")]
    NotAPdf { name: String },

    /// PDF bytes could not be parsed, or the document is encrypted.
    #[error("Failed to process '{name}': {detail}")]
    InvalidPdf { name: String, detail: String },

    /// Image bytes could not be decoded.
    #[error("Failed to load image '{name}': {detail}")]
    ImageDecode { name: String, detail: String },

    // ── DOCX errors ───────────────────────────────────────────────────────
    /// The DOCX package itself is unreadable (not a ZIP, missing parts).
    #[error("Could not read DOCX package: {0}")]
    DocxParse(String),

    /// The DOCX produced no renderable HTML.
    #[error("'{name}' appears to be empty or could not be converted to HTML")]
    EmptyDocument { name: String },

    /// Rendering failed after every attempt of the retry ladder.
    #[error("Failed to capture the document after {attempts} attempt(s): {detail}")]
    Rasterization { attempts: usize, detail: String },

    /// The first page-height slice of the raster holds nothing visible.
    #[error(
        "First page of the PDF has no content; the rendered image most likely \
did not capture the document"
    )]
    EmptyFirstPage,

    /// Content verification found nothing to place on a page.
    #[error("No visible content: {detail}")]
    NoContent { detail: String },

    /// Any failure on the DOCX path, tagged with the offending file.
    #[error("Failed to convert DOCX '{name}': {source}")]
    DocxConversion {
        name: String,
        #[source]
        source: Box<StitchError>,
    },

    /// A render host call failed outside the retry ladder.
    #[error(transparent)]
    Host(#[from] HostError),

    // ── Batch errors ──────────────────────────────────────────────────────
    /// Every file of a batch failed; nothing to return.
    #[error("None of the {total} file(s) could be converted.\nFirst error: {first_error}")]
    AllFilesFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read an input file from disk.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StitchError {
    /// The underlying error with any per-file DOCX wrapper removed.
    pub fn root(&self) -> &StitchError {
        match self {
            StitchError::DocxConversion { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Failure reported by a [`crate::host::RenderHost`] implementation.
#[derive(Debug, Clone, Error)]
#[error("render host: {message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A non-fatal failure of one file inside a batch conversion.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Failed to convert '{name}': {message}")]
pub struct FileWarning {
    /// Source file name as supplied by the caller.
    pub name: String,
    /// Human-readable error description.
    pub message: String,
}

impl FileWarning {
    pub fn new(name: impl Into<String>, error: &StitchError) -> Self {
        Self {
            name: name.into(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_names_remediation() {
        let e = StitchError::UnsupportedFormat {
            name: "report.doc".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("report.doc"), "got: {msg}");
        assert!(msg.contains("DOCX"), "got: {msg}");
    }

    #[test]
    fn invalid_pdf_names_file() {
        let e = StitchError::InvalidPdf {
            name: "broken.pdf".into(),
            detail: "missing %PDF header".into(),
        };
        assert!(e.to_string().contains("broken.pdf"));
    }

    #[test]
    fn root_unwraps_docx_wrapper() {
        let e = StitchError::DocxConversion {
            name: "a.docx".into(),
            source: Box::new(StitchError::EmptyFirstPage),
        };
        assert!(matches!(e.root(), StitchError::EmptyFirstPage));
        assert!(e.to_string().contains("a.docx"));
    }

    #[test]
    fn host_error_is_transparent() {
        let e: StitchError = HostError::new("browser went away").into();
        assert_eq!(e.to_string(), "render host: browser went away");
    }

    #[test]
    fn file_warning_display() {
        let w = FileWarning::new(
            "old.doc",
            &StitchError::UnsupportedFormat {
                name: "old.doc".into(),
            },
        );
        assert!(w.to_string().starts_with("Failed to convert 'old.doc'"));
    }
}
