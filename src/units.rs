//! Unit conversion between raster pixel space and physical page space.
//!
//! Everything downstream of the rasterizer reasons in millimetres on an A4
//! page, while the rasterizer produces pixels at some scale factor. The
//! conversions assume the CSS reference density of 96 pixels per inch, which
//! is what a browser layout engine uses when it lays out the staged HTML.
//!
//! The page geometry is fixed: A4 with 20 mm margins on every side, leaving
//! a 170 × 257 mm content area. It is not configurable because the output
//! page format is not configurable.

/// Millimetres covered by one CSS pixel at 96 DPI.
pub const MM_PER_PX: f64 = 0.264583;

/// PDF points per CSS pixel (72 / 96).
pub const PT_PER_PX: f64 = 0.75;

/// Millimetres per inch.
const MM_PER_INCH: f64 = 25.4;

/// A4 page width in millimetres.
pub const A4_WIDTH_MM: f64 = 210.0;

/// A4 page height in millimetres.
pub const A4_HEIGHT_MM: f64 = 297.0;

/// Margin applied on all four sides of a raster page.
pub const PAGE_MARGIN_MM: f64 = 20.0;

/// Width of the printable content area (A4 minus both side margins).
pub const CONTENT_WIDTH_MM: f64 = A4_WIDTH_MM - 2.0 * PAGE_MARGIN_MM;

/// Height of the printable content area (A4 minus top and bottom margins).
pub const CONTENT_HEIGHT_MM: f64 = A4_HEIGHT_MM - 2.0 * PAGE_MARGIN_MM;

/// Width of the staged HTML container: 170 mm at 96 DPI, rounded.
pub const CONTAINER_WIDTH_PX: u32 = 643;

/// Convert a pixel length at the given rasterization scale to millimetres.
pub fn pixels_to_mm(px: f64, scale: f64) -> f64 {
    px / scale * MM_PER_PX
}

/// Convert a millimetre length to pixels at the given rasterization scale.
pub fn mm_to_pixels(mm: f64, scale: f64) -> f64 {
    mm / MM_PER_PX * scale
}

/// Number of content-area pages needed to hold `height_mm` of content.
///
/// Zero height needs zero pages.
pub fn pages_needed(height_mm: f64, content_height_mm: f64) -> usize {
    if height_mm <= 0.0 || content_height_mm <= 0.0 {
        return 0;
    }
    (height_mm / content_height_mm).ceil() as usize
}

/// Convert millimetres to PDF points.
pub fn mm_to_points(mm: f64) -> f64 {
    mm * 72.0 / MM_PER_INCH
}

/// Convert CSS pixels (scale 1) to PDF points.
pub fn pixels_to_points(px: f64) -> f64 {
    px * PT_PER_PX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_needed_matches_ceiling() {
        assert_eq!(pages_needed(514.0, 257.0), 2);
        assert_eq!(pages_needed(257.0, 257.0), 1);
        assert_eq!(pages_needed(0.0, 257.0), 0);
        assert_eq!(pages_needed(257.5, 257.0), 2);
        assert_eq!(pages_needed(1.0, 257.0), 1);
    }

    #[test]
    fn content_area_is_a4_minus_margins() {
        assert_eq!(CONTENT_WIDTH_MM, 170.0);
        assert_eq!(CONTENT_HEIGHT_MM, 257.0);
    }

    #[test]
    fn scale_is_divided_out() {
        let at_one = pixels_to_mm(100.0, 1.0);
        let at_two = pixels_to_mm(200.0, 2.0);
        assert!((at_one - at_two).abs() < 1e-9);
        assert!((at_one - 26.4583).abs() < 1e-9);
    }

    #[test]
    fn mm_pixel_round_trip() {
        let px = mm_to_pixels(CONTENT_HEIGHT_MM, 1.5);
        assert!((pixels_to_mm(px, 1.5) - CONTENT_HEIGHT_MM).abs() < 1e-9);
    }

    #[test]
    fn container_width_is_content_width_at_96_dpi() {
        let px = mm_to_pixels(CONTENT_WIDTH_MM, 1.0);
        assert_eq!(px.round() as u32, CONTAINER_WIDTH_PX);
    }

    #[test]
    fn a4_in_points() {
        assert!((mm_to_points(A4_WIDTH_MM) - 595.2756).abs() < 1e-3);
        assert!((pixels_to_points(96.0) - 72.0).abs() < 1e-9);
    }
}
