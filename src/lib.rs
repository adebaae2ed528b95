//! # pdf-stitch
//!
//! Merge PDF files and convert images and Word documents to PDF, entirely on
//! the local machine. File contents never leave the process.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF  ──▶ page copy ───────────────────────────────────────────┐
//! JPEG/PNG ──▶ decode ──▶ one page sized to the image ──────────┤
//! DOCX ──▶ HTML ──▶ stage ──▶ rasterize ──▶ verify ──▶ slice ───┴──▶ lopdf ──▶ bytes
//!          (zip +    (render   (retry        (pixel    (A4
//!          quick-xml) host)     ladder)      scan)     chunks)
//! ```
//!
//! DOCX output is raster-only: every page is an image of the rendered
//! document. Legacy `.doc` files are rejected up front.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_stitch::{convert_batch, merge_pdfs, ConversionConfig, NoRenderHost, SourceFile, SourceKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let a = SourceFile::new("a.pdf", SourceKind::Pdf, std::fs::read("a.pdf")?);
//!     let b = SourceFile::new("b.pdf", SourceKind::Pdf, std::fs::read("b.pdf")?);
//!     let merged = merge_pdfs(&[a, b])?;
//!     std::fs::write(&merged.filename, &merged.bytes)?;
//!
//!     // Images need no render host; DOCX files do (see `ChromeHost`).
//!     let photo = SourceFile::new("photo.jpg", SourceKind::Jpeg, std::fs::read("photo.jpg")?);
//!     let out = convert_batch(&[photo], &mut NoRenderHost, &ConversionConfig::default()).await?;
//!     eprintln!("{} page(s), {} warning(s)", out.result.page_count, out.warnings.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `cli`      | on      | Enables the `pdfstitch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `headless` | off     | Enables [`ChromeHost`], which renders DOCX through headless Chrome |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-stitch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod docx;
pub mod error;
pub mod host;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod stylesheet;
pub mod units;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, Pacing, MAX_RENDER_ATTEMPTS};
pub use convert::{convert_batch, convert_batch_with, convert_to_pdf, convert_to_pdf_with, merge_pdfs};
pub use docx::{BuiltinDocxConverter, DocxHtml, DocxMessage, DocxToHtml, Severity, StyleMap};
pub use error::{FileWarning, HostError, StitchError};
#[cfg(feature = "headless")]
pub use host::ChromeHost;
pub use host::{NoRenderHost, RenderHost};
pub use output::{write_result, BatchOutput, ConversionResult, ConversionStats};
pub use pipeline::input::load_source;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use source::{SourceFile, SourceKind};
