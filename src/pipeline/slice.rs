//! Stage: cut a tall raster into page-height chunks.
//!
//! A rendered DOCX is one long strip. Each A4 page holds 257 mm of it, so the
//! strip is cut every `mm_to_pixels(257, scale)` rows. Chunks are composited
//! onto white so transparent regions of the raster print as paper.
//!
//! Only three horizontal bands of each chunk are checked for content (top,
//! middle, bottom). The first empty chunk ends the document: it and every
//! chunk after it are dropped rather than emitted as blank pages.

use crate::error::StitchError;
use crate::pipeline::rasterize::RasterImage;
use crate::pipeline::verify::{has_visible_content, Region};
use crate::units::{mm_to_pixels, pages_needed, pixels_to_mm, CONTENT_HEIGHT_MM};
use image::{imageops, Rgba, RgbaImage};
use tracing::{debug, warn};

/// Height of one sampling band, in raster pixels.
pub const BAND_HEIGHT_PX: u32 = 200;

/// One page worth of raster.
#[derive(Debug, Clone)]
pub struct PageChunk {
    /// 0-based position, top to bottom.
    pub index: usize,
    /// Same width as the source raster, composited onto white.
    pub image: RgbaImage,
    /// Physical height on the page, at most 257 mm.
    pub height_mm: f64,
    pub has_content: bool,
}

/// Sampling bands for a chunk `width × height` pixels.
fn sample_bands(width: u32, height: u32) -> Vec<Region> {
    let band = BAND_HEIGHT_PX.min(height);
    let mut bands = vec![Region::new(0, 0, width, band)];
    if height > BAND_HEIGHT_PX {
        bands.push(Region::new(0, height / 2, width, band));
    }
    if height > 2 * BAND_HEIGHT_PX {
        bands.push(Region::new(0, height - band, width, band));
    }
    bands
}

/// Whether any sampling band of `image` holds content.
pub fn chunk_has_content(image: &RgbaImage) -> bool {
    sample_bands(image.width(), image.height())
        .into_iter()
        .any(|band| has_visible_content(image, Some(band)))
}

/// Copy rows `[start, end)` of `source` onto a white buffer.
fn composite_rows(source: &RgbaImage, start: u32, end: u32) -> RgbaImage {
    let rows = imageops::crop_imm(source, 0, start, source.width(), end - start).to_image();
    let mut page = RgbaImage::from_pixel(rows.width(), rows.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut page, &rows, 0, 0);
    page
}

/// Slice `raster` into page chunks.
///
/// Fails with [`StitchError::EmptyFirstPage`] when the first chunk is blank,
/// so a returned list always holds at least one chunk.
pub fn slice(raster: &RasterImage) -> Result<Vec<PageChunk>, StitchError> {
    let (width, height) = (raster.width(), raster.height());
    let total_mm = pixels_to_mm(height as f64, raster.scale);
    let pages = pages_needed(total_mm, CONTENT_HEIGHT_MM);
    let page_px = mm_to_pixels(CONTENT_HEIGHT_MM, raster.scale);

    debug!(
        "Slicing {}×{} px raster ({:.1} mm) into {} page(s) of {:.1} px",
        width, height, total_mm, pages, page_px
    );

    let mut chunks = Vec::with_capacity(pages);
    for index in 0..pages {
        let start = ((index as f64 * page_px).round() as u32).min(height);
        let end = (((index + 1) as f64 * page_px).round() as u32).min(height);
        if end <= start {
            break;
        }

        let image = composite_rows(&raster.pixels, start, end);
        let has_content = chunk_has_content(&image);
        if !has_content {
            if index == 0 {
                return Err(StitchError::EmptyFirstPage);
            }
            warn!(
                "Page {} of {} has no content; dropping it and the rest",
                index + 1,
                pages
            );
            break;
        }

        let height_mm = pixels_to_mm((end - start) as f64, raster.scale).min(CONTENT_HEIGHT_MM);
        chunks.push(PageChunk {
            index,
            image,
            height_mm,
            has_content,
        });
    }

    if chunks.is_empty() {
        return Err(StitchError::EmptyFirstPage);
    }
    Ok(chunks)
}
