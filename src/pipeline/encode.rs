//! Image encoding: pixels or JPEG bytes → PDF image XObject.
//!
//! JPEG sources with one or three colour components are embedded untouched
//! with `DCTDecode`; PDF viewers decode baseline and progressive JPEG
//! natively, so re-encoding would only cost quality. Everything else
//! (PNG, CMYK JPEG, rendered rasters) is flattened onto white and stored as
//! 8-bit DeviceRGB, left for [`lopdf::Document::compress`] to Flate-encode.

use crate::error::StitchError;
use crate::source::SourceKind;
use image::{DynamicImage, ImageFormat, RgbaImage};
use lopdf::{dictionary, Object, Stream};
use tracing::debug;

/// Pixel data ready to become an image XObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
    pub data: Vec<u8>,
    /// `Some("DCTDecode")` for pass-through JPEG, `None` for raw samples.
    pub filter: Option<&'static str>,
}

impl EncodedImage {
    /// Build the `/XObject /Image` stream.
    pub fn to_stream(&self) -> Stream {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => self.width as i64,
            "Height" => self.height as i64,
            "ColorSpace" => self.color_space,
            "BitsPerComponent" => 8,
        };
        match self.filter {
            Some(filter) => {
                dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
                Stream::new(dict, self.data.clone()).with_compression(false)
            }
            None => Stream::new(dict, self.data.clone()),
        }
    }
}

/// Flatten an RGBA raster onto white and keep the RGB samples.
pub fn encode_rgba(image: &RgbaImage) -> EncodedImage {
    let mut data = Vec::with_capacity(image.width() as usize * image.height() as usize * 3);
    for px in image.pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        for c in [r, g, b] {
            data.push(((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8);
        }
    }
    EncodedImage {
        width: image.width(),
        height: image.height(),
        color_space: "DeviceRGB",
        data,
        filter: None,
    }
}

/// Frame header of a JPEG stream: `(width, height, components)`.
///
/// Walks the marker segments up to the first start-of-frame. Returns `None`
/// for anything that is not a well-formed JPEG header.
pub fn jpeg_frame_info(bytes: &[u8]) -> Option<(u32, u32, u8)> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // Standalone markers carry no length.
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        if marker == 0xD9 || marker == 0xDA {
            return None;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let seg = bytes.get(pos + 4..pos + 2 + len)?;
            if seg.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([seg[1], seg[2]]) as u32;
            let width = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            return Some((width, height, seg[5]));
        }
        pos += 2 + len;
    }
    None
}

/// Decode image bytes, naming the file on failure.
pub fn decode_image(name: &str, kind: SourceKind, bytes: &[u8]) -> Result<DynamicImage, StitchError> {
    let format = match kind {
        SourceKind::Jpeg => ImageFormat::Jpeg,
        SourceKind::Png => ImageFormat::Png,
        other => {
            return Err(StitchError::ImageDecode {
                name: name.to_string(),
                detail: format!("{other} is not an image format"),
            })
        }
    };
    image::load_from_memory_with_format(bytes, format).map_err(|e| StitchError::ImageDecode {
        name: name.to_string(),
        detail: e.to_string(),
    })
}

/// Encode an image source for a PDF page.
///
/// The bytes are always fully decoded first, so a truncated JPEG fails here
/// rather than producing a PDF that viewers refuse to draw.
pub fn encode_source_image(
    name: &str,
    kind: SourceKind,
    bytes: &[u8],
) -> Result<EncodedImage, StitchError> {
    let decoded = decode_image(name, kind, bytes)?;

    if kind == SourceKind::Jpeg {
        if let Some((w, h, components @ (1 | 3))) = jpeg_frame_info(bytes) {
            debug!("{}: embedding {}×{} JPEG as DCTDecode", name, w, h);
            return Ok(EncodedImage {
                width: decoded.width(),
                height: decoded.height(),
                color_space: if components == 1 {
                    "DeviceGray"
                } else {
                    "DeviceRGB"
                },
                data: bytes.to_vec(),
                filter: Some("DCTDecode"),
            });
        }
    }

    debug!(
        "{}: re-encoding {}×{} image as DeviceRGB",
        name,
        decoded.width(),
        decoded.height()
    );
    Ok(encode_rgba(&decoded.to_rgba8()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};
    use std::io::Cursor;

    fn jpeg_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 30, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg).unwrap();
        buf
    }

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([0, 0, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn jpeg_header_is_read() {
        let bytes = jpeg_bytes(37, 21);
        assert_eq!(jpeg_frame_info(&bytes), Some((37, 21, 3)));
        assert_eq!(jpeg_frame_info(b"not a jpeg"), None);
    }

    #[test]
    fn rgb_jpeg_passes_through() {
        let bytes = jpeg_bytes(40, 30);
        let enc = encode_source_image("a.jpg", SourceKind::Jpeg, &bytes).unwrap();
        assert_eq!(enc.filter, Some("DCTDecode"));
        assert_eq!(enc.data, bytes);
        assert_eq!((enc.width, enc.height), (40, 30));
    }

    #[test]
    fn png_is_flattened_to_rgb() {
        let enc = encode_source_image("a.png", SourceKind::Png, &png_bytes(5, 4)).unwrap();
        assert_eq!(enc.filter, None);
        assert_eq!(enc.data.len(), 5 * 4 * 3);
        assert_eq!(&enc.data[..3], &[0, 0, 255]);
    }

    #[test]
    fn truncated_jpeg_is_a_decode_error() {
        let mut bytes = jpeg_bytes(64, 64);
        bytes.truncate(20);
        let err = encode_source_image("cut.jpg", SourceKind::Jpeg, &bytes).unwrap_err();
        assert!(matches!(err, StitchError::ImageDecode { ref name, .. } if name == "cut.jpg"));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        assert_eq!(encode_rgba(&img).data, vec![255; 6]);
    }

    #[test]
    fn stream_dictionary() {
        let enc = encode_rgba(&RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255])));
        let stream = enc.to_stream();
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 3);
        assert_eq!(stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceRGB");
        assert!(stream.dict.get(b"Filter").is_err());
    }
}
