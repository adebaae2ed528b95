//! Conversion entry points: merge, single-file conversion, batch conversion.
//!
//! ## Paths
//!
//! * **PDF merge** copies every page of every input into one document.
//! * **Images** become one page each, sized to the image at 96 DPI.
//! * **DOCX** goes through HTML: the markup is staged in a render host,
//!   rasterized, cut into A4-height chunks and placed one chunk per page.
//!   The output is raster-only; there is no selectable text.
//!
//! Files are always processed one after another. A render host has one
//! document and one staged element at a time, which `&mut H` enforces.

use crate::config::{pause, ConversionConfig};
use crate::docx::{BuiltinDocxConverter, DocxToHtml, Severity};
use crate::error::{FileWarning, StitchError};
use crate::host::{RenderHost, StageRequest, StagedElement};
use crate::output::{
    batch_filename, converted_filename, merged_filename, BatchOutput, ConversionResult,
    ConversionStats,
};
use crate::pipeline::assemble::PdfAssembler;
use crate::pipeline::encode::encode_source_image;
use crate::pipeline::rasterize::rasterize_with_retry;
use crate::pipeline::slice::slice;
use crate::pipeline::verify::has_visible_content;
use crate::source::{SourceFile, SourceKind};
use crate::stylesheet::{container_style, scoped_stylesheet, CONTAINER_CLASS};
use crate::units::pixels_to_points;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Merge PDF files into one document, in input order.
///
/// # Errors
/// - [`StitchError::NoInput`] for an empty slice
/// - [`StitchError::NotAPdf`] for a file not declared as PDF
/// - [`StitchError::InvalidPdf`] for a file that cannot be loaded
///
/// Any failing file aborts the whole merge; there is no partial output.
pub fn merge_pdfs(files: &[SourceFile]) -> Result<ConversionResult, StitchError> {
    if files.is_empty() {
        return Err(StitchError::NoInput);
    }
    info!("Merging {} PDF file(s)", files.len());

    let mut assembler = PdfAssembler::new();
    for file in files {
        if file.kind != SourceKind::Pdf {
            return Err(StitchError::NotAPdf {
                name: file.name.clone(),
            });
        }
        let copied = assembler.copy_all_pages(&file.name, &file.bytes)?;
        debug!("{}: copied {} page(s)", file.name, copied);
    }

    let page_count = assembler.page_count();
    let bytes = assembler.serialize()?;
    info!("Merged {} page(s), {} bytes", page_count, bytes.len());

    Ok(ConversionResult {
        bytes,
        filename: merged_filename(Utc::now()),
        page_count,
    })
}

/// Convert one image or DOCX file to PDF using the built-in DOCX converter.
///
/// See [`convert_to_pdf_with`].
pub async fn convert_to_pdf<H: RenderHost>(
    file: &SourceFile,
    host: &mut H,
    config: &ConversionConfig,
) -> Result<ConversionResult, StitchError> {
    convert_to_pdf_with(file, host, config, Arc::new(BuiltinDocxConverter)).await
}

/// Convert one image or DOCX file to PDF.
///
/// The host is only touched for DOCX input. The converter runs on the
/// blocking thread pool, hence the `Arc`.
///
/// # Errors
/// - [`StitchError::UnsupportedFormat`] for legacy `.doc` files
/// - [`StitchError::UnsupportedFileType`] for PDF input (use [`merge_pdfs`])
/// - [`StitchError::ImageDecode`] for unreadable images
/// - [`StitchError::DocxConversion`] wrapping any DOCX-path failure
pub async fn convert_to_pdf_with<H: RenderHost>(
    file: &SourceFile,
    host: &mut H,
    config: &ConversionConfig,
    converter: Arc<dyn DocxToHtml>,
) -> Result<ConversionResult, StitchError> {
    let start = Instant::now();
    let (bytes, page_count) = match file.kind {
        SourceKind::Jpeg | SourceKind::Png => image_to_pdf(file)?,
        SourceKind::Word => docx_to_pdf(file, host, config, converter)
            .await
            .map_err(|e| StitchError::DocxConversion {
                name: file.name.clone(),
                source: Box::new(e),
            })?,
        SourceKind::LegacyWord => {
            return Err(StitchError::UnsupportedFormat {
                name: file.name.clone(),
            })
        }
        SourceKind::Pdf => {
            return Err(StitchError::UnsupportedFileType {
                name: file.name.clone(),
            })
        }
    };

    info!(
        "Converted {} to {} page(s) in {}ms",
        file.name,
        page_count,
        start.elapsed().as_millis()
    );
    Ok(ConversionResult {
        bytes,
        filename: converted_filename(&file.name, Utc::now()),
        page_count,
    })
}

/// Convert several files with the built-in DOCX converter.
///
/// See [`convert_batch_with`].
pub async fn convert_batch<H: RenderHost>(
    files: &[SourceFile],
    host: &mut H,
    config: &ConversionConfig,
) -> Result<BatchOutput, StitchError> {
    convert_batch_with(files, host, config, Arc::new(BuiltinDocxConverter)).await
}

/// Convert several files, strictly one after another, into one PDF.
///
/// A file that fails is recorded as a [`FileWarning`] and the batch carries
/// on. One success returns that file's PDF as-is; several are merged in
/// input order.
///
/// # Errors
/// - [`StitchError::NoInput`] for an empty slice
/// - [`StitchError::AllFilesFailed`] when no file converted
pub async fn convert_batch_with<H: RenderHost>(
    files: &[SourceFile],
    host: &mut H,
    config: &ConversionConfig,
    converter: Arc<dyn DocxToHtml>,
) -> Result<BatchOutput, StitchError> {
    if files.is_empty() {
        return Err(StitchError::NoInput);
    }
    let start = Instant::now();
    let total = files.len();
    info!("Converting {} file(s)", total);

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut converted: Vec<(String, ConversionResult)> = Vec::with_capacity(total);
    let mut warnings = Vec::new();

    for (index, file) in files.iter().enumerate() {
        if let Some(ref cb) = config.progress_callback {
            cb.on_file_start(index, total, &file.name);
        }
        match convert_to_pdf_with(file, host, config, Arc::clone(&converter)).await {
            Ok(result) => {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_complete(index, total, &file.name, result.page_count);
                }
                converted.push((file.name.clone(), result));
            }
            Err(e) => {
                warn!("Skipping {}: {}", file.name, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_file_error(index, total, &file.name, &e.to_string());
                }
                warnings.push(FileWarning::new(&file.name, &e));
            }
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, converted.len());
    }

    if converted.is_empty() {
        let first_error = warnings
            .first()
            .map(|w| w.message.clone())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(StitchError::AllFilesFailed { total, first_error });
    }

    let names: Vec<String> = converted.iter().map(|(n, _)| n.clone()).collect();
    let result = if converted.len() == 1 {
        let (_, result) = converted.remove(0);
        result
    } else {
        let mut assembler = PdfAssembler::new();
        for (name, result) in &converted {
            assembler.copy_all_pages(name, &result.bytes)?;
        }
        let page_count = assembler.page_count();
        ConversionResult {
            bytes: assembler.serialize()?,
            filename: batch_filename(Utc::now()),
            page_count,
        }
    };

    let stats = ConversionStats {
        total_files: total,
        converted_files: names.len(),
        failed_files: warnings.len(),
        page_count: result.page_count,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Batch complete: {}/{} file(s), {} page(s), {}ms",
        stats.converted_files, total, stats.page_count, stats.duration_ms
    );

    Ok(BatchOutput {
        result,
        converted: names,
        warnings,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// One page sized to the image at 96 DPI, the image filling it.
fn image_to_pdf(file: &SourceFile) -> Result<(Vec<u8>, usize), StitchError> {
    let image = encode_source_image(&file.name, file.kind, &file.bytes)?;
    let width_pt = pixels_to_points(image.width as f64) as f32;
    let height_pt = pixels_to_points(image.height as f64) as f32;
    debug!(
        "{}: {}×{} px → {:.1}×{:.1} pt ({})",
        file.name,
        image.width,
        image.height,
        width_pt,
        height_pt,
        if image.width > image.height {
            "landscape"
        } else {
            "portrait"
        }
    );

    let mut assembler = PdfAssembler::new();
    assembler.append_image_page(&image, width_pt, height_pt);
    Ok((assembler.serialize()?, 1))
}

async fn docx_to_pdf<H: RenderHost>(
    file: &SourceFile,
    host: &mut H,
    config: &ConversionConfig,
    converter: Arc<dyn DocxToHtml>,
) -> Result<(Vec<u8>, usize), StitchError> {
    let bytes = file.bytes.clone();
    let style_map = config.style_map.clone();
    let html = tokio::task::spawn_blocking(move || converter.convert(&bytes, &style_map))
        .await
        .map_err(|e| StitchError::Internal(format!("DOCX conversion task failed: {e}")))??;

    for message in &html.messages {
        if message.severity == Severity::Error {
            error!("{}: {}", file.name, message.message);
        }
    }
    if html.is_blank() {
        return Err(StitchError::EmptyDocument {
            name: file.name.clone(),
        });
    }
    debug!("{}: {} bytes of HTML", file.name, html.html.len());

    let stylesheet = scoped_stylesheet(CONTAINER_CLASS);
    let style = container_style();
    let element = host
        .stage(&StageRequest {
            html: &html.html,
            stylesheet: &stylesheet,
            container_class: CONTAINER_CLASS,
            container_style: &style,
        })
        .await?;

    let result = render_staged(host, &element, file, config).await;

    if let Err(e) = host.unstage(element).await {
        warn!("Could not remove staged container for {}: {}", file.name, e);
    }
    result
}

async fn render_staged<H: RenderHost>(
    host: &mut H,
    element: &StagedElement,
    file: &SourceFile,
    config: &ConversionConfig,
) -> Result<(Vec<u8>, usize), StitchError> {
    let had_images =
        match tokio::time::timeout(config.image_wait_timeout(), host.wait_for_images(element)).await {
            Ok(Ok(report)) => {
                if report.failed > 0 {
                    warn!(
                        "{}: {}/{} image(s) failed to load",
                        file.name, report.failed, report.total
                    );
                }
                report.total > 0
            }
            Ok(Err(e)) => {
                warn!("{}: could not wait for images: {}", file.name, e);
                false
            }
            Err(_) => {
                warn!(
                    "{}: images still loading after {}ms, rendering anyway",
                    file.name, config.image_wait_timeout_ms
                );
                true
            }
        };
    pause(config.pacing.image_settle(had_images)).await;

    let metrics = host.measure(element).await?;
    if metrics.text_len == 0 && metrics.image_count == 0 {
        return Err(StitchError::EmptyDocument {
            name: file.name.clone(),
        });
    }

    let raster = rasterize_with_retry(host, element, config).await?;
    debug!(
        "{}: raster {}×{} at scale {}",
        file.name,
        raster.width(),
        raster.height(),
        raster.scale
    );
    if !has_visible_content(&raster.pixels, None) {
        return Err(StitchError::NoContent {
            detail: format!(
                "the rendered {}×{} image is blank",
                raster.width(),
                raster.height()
            ),
        });
    }

    let chunks = slice(&raster)?;

    let mut assembler = PdfAssembler::new();
    for chunk in &chunks {
        assembler.append_raster_page(chunk);
    }
    let page_count = assembler.page_count();
    Ok((assembler.serialize()?, page_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NoRenderHost;
    use crate::pipeline::assemble::count_pages;
    use crate::pipeline::assemble::tests::sample_pdf;

    fn pdf(name: &str, pages: usize) -> SourceFile {
        SourceFile::new(name, SourceKind::Pdf, sample_pdf(name, pages))
    }

    #[test]
    fn merge_keeps_every_page() {
        let out = merge_pdfs(&[pdf("a.pdf", 2), pdf("b.pdf", 3)]).unwrap();
        assert_eq!(out.page_count, 5);
        assert_eq!(count_pages(&out.bytes).unwrap(), 5);
        assert!(out.filename.starts_with("merged-"));
        assert!(out.filename.ends_with(".pdf"));
    }

    #[test]
    fn merge_rejects_empty_input() {
        assert!(matches!(merge_pdfs(&[]), Err(StitchError::NoInput)));
    }

    #[test]
    fn merge_rejects_non_pdf_kind() {
        let png = SourceFile::new("scan.png", SourceKind::Png, vec![0x89, b'P']);
        let err = merge_pdfs(&[pdf("a.pdf", 1), png]).unwrap_err();
        assert!(matches!(err, StitchError::NotAPdf { ref name } if name == "scan.png"));
    }

    #[test]
    fn merge_names_the_broken_file() {
        let broken = SourceFile::new("broken.pdf", SourceKind::Pdf, Vec::new());
        let err = merge_pdfs(&[pdf("a.pdf", 1), broken]).unwrap_err();
        assert!(matches!(err, StitchError::InvalidPdf { .. }));
        assert!(err.to_string().contains("broken.pdf"));
    }

    #[tokio::test]
    async fn legacy_word_fails_without_rendering() {
        let doc = SourceFile::new("old.doc", SourceKind::LegacyWord, vec![0xD0, 0xCF]);
        let err = convert_to_pdf(&doc, &mut NoRenderHost, &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StitchError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn pdf_is_not_convertible() {
        let err = convert_to_pdf(&pdf("a.pdf", 1), &mut NoRenderHost, &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StitchError::UnsupportedFileType { .. }));
    }

    #[tokio::test]
    async fn batch_of_nothing_is_no_input() {
        let err = convert_batch(&[], &mut NoRenderHost, &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StitchError::NoInput));
    }
}
