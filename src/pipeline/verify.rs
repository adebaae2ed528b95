//! Stage: content verification.
//!
//! Decides whether a raster region holds anything other than background.
//! A pixel counts as content when any of its colour channels is darker than
//! [`NEAR_WHITE_THRESHOLD`]; alpha is ignored, so a fully transparent black
//! pixel still counts.
//!
//! Two tiers run in order: a chunked pass that looks at every pixel in
//! 100 px squares (row-major, stopping at the first hit), then a sparse
//! stride pass over every 10th pixel in both axes.

use image::RgbaImage;

/// Edge length of one square chunk in the first tier.
pub const CHUNK_EDGE_PX: u32 = 100;

/// Sampling stride of the second tier, in both axes.
pub const STRIDE_PX: u32 = 10;

/// Channel values at or above this are treated as background.
pub const NEAR_WHITE_THRESHOLD: u8 = 250;

/// A rectangle in raster pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole image.
    pub fn full(image: &RgbaImage) -> Self {
        Self::new(0, 0, image.width(), image.height())
    }

    /// Intersect with the bounds of `image`.
    pub fn clip_to(self, image: &RgbaImage) -> Self {
        let x = self.x.min(image.width());
        let y = self.y.min(image.height());
        let right = self.x.saturating_add(self.width).min(image.width());
        let bottom = self.y.saturating_add(self.height).min(image.height());
        Self::new(x, y, right - x, bottom - y)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[inline]
fn is_content(image: &RgbaImage, x: u32, y: u32) -> bool {
    let p = image.get_pixel(x, y).0;
    p[0] < NEAR_WHITE_THRESHOLD || p[1] < NEAR_WHITE_THRESHOLD || p[2] < NEAR_WHITE_THRESHOLD
}

/// Whether `region` (default: the whole image) holds any non-background pixel.
pub fn has_visible_content(image: &RgbaImage, region: Option<Region>) -> bool {
    let region = region.unwrap_or_else(|| Region::full(image)).clip_to(image);
    if region.is_empty() {
        return false;
    }
    chunked_scan(image, region) || stride_scan(image, region)
}

/// First tier: every pixel, visited chunk by chunk.
pub fn chunked_scan(image: &RgbaImage, region: Region) -> bool {
    let region = region.clip_to(image);
    let (x_end, y_end) = (region.x + region.width, region.y + region.height);

    let mut cy = region.y;
    while cy < y_end {
        let ch = CHUNK_EDGE_PX.min(y_end - cy);
        let mut cx = region.x;
        while cx < x_end {
            let cw = CHUNK_EDGE_PX.min(x_end - cx);
            for y in cy..cy + ch {
                for x in cx..cx + cw {
                    if is_content(image, x, y) {
                        return true;
                    }
                }
            }
            cx += CHUNK_EDGE_PX;
        }
        cy += CHUNK_EDGE_PX;
    }
    false
}

/// Second tier: every [`STRIDE_PX`]-th pixel in both axes.
pub fn stride_scan(image: &RgbaImage, region: Region) -> bool {
    let region = region.clip_to(image);
    let (x_end, y_end) = (region.x + region.width, region.y + region.height);
    (region.y..y_end)
        .step_by(STRIDE_PX as usize)
        .any(|y| (region.x..x_end).step_by(STRIDE_PX as usize).any(|x| is_content(image, x, y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn white(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn all_white_has_no_content() {
        let img = white(320, 240);
        assert!(!has_visible_content(&img, None));
    }

    #[test]
    fn single_black_pixel_is_found() {
        let mut img = white(320, 240);
        img.put_pixel(217, 133, Rgba([0, 0, 0, 255]));
        assert!(has_visible_content(&img, None));
        assert!(chunked_scan(&img, Region::full(&img)));
    }

    #[test]
    fn stride_tier_sees_pixels_on_the_grid_only() {
        let mut img = white(100, 100);
        img.put_pixel(40, 70, Rgba([0, 0, 0, 255]));
        assert!(stride_scan(&img, Region::full(&img)));

        let mut off_grid = white(100, 100);
        off_grid.put_pixel(41, 71, Rgba([0, 0, 0, 255]));
        assert!(!stride_scan(&off_grid, Region::full(&off_grid)));
        assert!(has_visible_content(&off_grid, None));
    }

    #[test]
    fn threshold_is_strict() {
        let mut img = white(10, 10);
        img.put_pixel(5, 5, Rgba([250, 250, 250, 255]));
        assert!(!has_visible_content(&img, None));
        img.put_pixel(5, 5, Rgba([255, 249, 255, 255]));
        assert!(has_visible_content(&img, None));
    }

    #[test]
    fn alpha_is_ignored() {
        let mut img = white(10, 10);
        img.put_pixel(1, 1, Rgba([0, 0, 0, 0]));
        assert!(has_visible_content(&img, None));
    }

    #[test]
    fn region_limits_the_scan() {
        let mut img = white(300, 300);
        img.put_pixel(250, 250, Rgba([0, 0, 0, 255]));
        assert!(!has_visible_content(&img, Some(Region::new(0, 0, 200, 200))));
        assert!(has_visible_content(&img, Some(Region::new(200, 200, 100, 100))));
    }

    #[test]
    fn zero_area_region_is_empty() {
        let mut img = white(50, 50);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        assert!(!has_visible_content(&img, Some(Region::new(0, 0, 0, 50))));
        assert!(!has_visible_content(&white(0, 0), None));
    }

    #[test]
    fn region_is_clipped_to_bounds() {
        let mut img = white(120, 80);
        img.put_pixel(119, 79, Rgba([10, 10, 10, 255]));
        let r = Region::new(100, 60, 500, 500).clip_to(&img);
        assert_eq!(r, Region::new(100, 60, 20, 20));
        assert!(has_visible_content(&img, Some(Region::new(100, 60, 500, 500))));
        assert!(!has_visible_content(&img, Some(Region::new(500, 500, 10, 10))));
    }
}
