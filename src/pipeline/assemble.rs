//! Stage: PDF assembly.
//!
//! [`PdfAssembler`] owns the output document for the whole of one conversion
//! or merge. Pages are only ever appended, in call order; nothing reorders
//! or removes them. [`PdfAssembler::serialize`] consumes the assembler, so a
//! finished document cannot be appended to by accident.

use crate::error::StitchError;
use crate::pipeline::encode::{encode_rgba, EncodedImage};
use crate::pipeline::slice::PageChunk;
use crate::units::{mm_to_points, A4_HEIGHT_MM, A4_WIDTH_MM, CONTENT_WIDTH_MM, PAGE_MARGIN_MM};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// How far up the page tree to look for inherited attributes.
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when a source page has no MediaBox anywhere.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

fn internal(err: lopdf::Error) -> StitchError {
    StitchError::Internal(format!("pdf assembly error: {err}"))
}

fn invalid(name: &str, detail: impl Into<String>) -> StitchError {
    StitchError::InvalidPdf {
        name: name.to_string(),
        detail: detail.into(),
    }
}

fn rect(values: [f32; 4]) -> Object {
    Object::Array(values.iter().map(|v| Object::Real(*v)).collect())
}

/// Accumulates pages into one output PDF.
pub struct PdfAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfAssembler {
    /// An empty PDF 1.7 document.
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn add_image_page(&mut self, image: &EncodedImage, media_box: [f32; 4], placement: [f32; 4]) {
        let image_id = self.doc.add_object(image.to_stream());
        let [x, y, w, h] = placement;
        let content = format!("q {w:.4} 0 0 {h:.4} {x:.4} {y:.4} cm /Im1 Do Q\n").into_bytes();
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => rect(media_box),
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        self.kids.push(page_id);
    }

    /// Append one A4 page holding `chunk` inside the 20 mm margins.
    ///
    /// The image is 170 mm wide and `chunk.height_mm` tall, anchored at the
    /// top margin.
    pub fn append_raster_page(&mut self, chunk: &PageChunk) {
        let page_w = mm_to_points(A4_WIDTH_MM) as f32;
        let page_h = mm_to_points(A4_HEIGHT_MM) as f32;
        let w = mm_to_points(CONTENT_WIDTH_MM) as f32;
        let h = mm_to_points(chunk.height_mm) as f32;
        let x = mm_to_points(PAGE_MARGIN_MM) as f32;
        let y = mm_to_points(A4_HEIGHT_MM - PAGE_MARGIN_MM - chunk.height_mm) as f32;

        debug!("Raster page {}: {:.1} mm tall", chunk.index + 1, chunk.height_mm);
        let image = encode_rgba(&chunk.image);
        self.add_image_page(&image, [0.0, 0.0, page_w, page_h], [x, y, w, h]);
    }

    /// Append a page exactly `width_pt × height_pt`, filled by `image`.
    pub fn append_image_page(&mut self, image: &EncodedImage, width_pt: f32, height_pt: f32) {
        self.add_image_page(
            image,
            [0.0, 0.0, width_pt, height_pt],
            [0.0, 0.0, width_pt, height_pt],
        );
    }

    /// Copy every page of the PDF in `bytes`, in order, to the end.
    ///
    /// Returns the number of pages copied. `name` only labels errors.
    pub fn copy_all_pages(&mut self, name: &str, bytes: &[u8]) -> Result<usize, StitchError> {
        let header_window = &bytes[..bytes.len().min(1024)];
        if !header_window.windows(5).any(|w| w == b"%PDF-") {
            return Err(invalid(name, "missing %PDF header"));
        }

        let mut src = Document::load_mem(bytes).map_err(|e| invalid(name, e.to_string()))?;
        if src.is_encrypted() {
            return Err(invalid(name, "document is encrypted"));
        }

        let start_id = self.doc.max_id + 1;
        src.renumber_objects_with(start_id);
        let page_ids: Vec<ObjectId> = src.get_pages().values().copied().collect();

        for &page_id in &page_ids {
            let inherited = collect_inherited(&src, page_id);
            let page = src
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(|e| invalid(name, e.to_string()))?;
            for (key, value) in inherited {
                page.set(key, value);
            }
            if !page.has(b"MediaBox") {
                page.set("MediaBox", rect(DEFAULT_MEDIA_BOX));
            }
            page.set("Parent", self.pages_id);
        }

        if src.max_id > self.doc.max_id {
            self.doc.max_id = src.max_id;
        }
        self.doc.objects.extend(src.objects);
        self.kids.extend(&page_ids);

        debug!("Copied {} page(s) from {}", page_ids.len(), name);
        Ok(page_ids.len())
    }

    /// Finish the document and return its bytes.
    pub fn serialize(mut self) -> Result<Vec<u8>, StitchError> {
        let kids: Vec<Object> = self.kids.iter().map(|id| Object::Reference(*id)).collect();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.kids.len() as i64,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.prune_objects();
        self.doc.renumber_objects();
        self.doc.compress();

        let mut out = Vec::new();
        self.doc.save_to(&mut out).map_err(|e| {
            StitchError::Internal(format!("pdf serialization failed: {e}"))
        })?;
        Ok(out)
    }
}

/// Inheritable attributes `page_id` lacks but an ancestor defines.
fn collect_inherited(doc: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    INHERITABLE
        .iter()
        .filter(|key| !page.has(key))
        .filter_map(|key| inherited_value(doc, page, key).map(|v| (*key, v)))
        .collect()
}

fn inherited_value(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Number of pages in a PDF, for callers that only need the count.
pub fn count_pages(bytes: &[u8]) -> Result<usize, lopdf::Error> {
    Ok(Document::load_mem(bytes)?.get_pages().len())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// A minimal PDF with `pages` pages, each tagged with its label.
    pub(crate) fn sample_pdf(label: &str, pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut kids = Vec::new();
        for i in 0..pages {
            let content = format!("BT /F1 18 Tf 72 720 Td ({label}-{i}) Tj ET").into_bytes();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        // MediaBox and Resources live on the Pages node and must be inherited.
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn page_texts(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned())
            .collect()
    }

    fn chunk(height_px: u32, height_mm: f64) -> PageChunk {
        PageChunk {
            index: 0,
            image: RgbaImage::from_pixel(643, height_px, Rgba([0, 0, 0, 255])),
            height_mm,
            has_content: true,
        }
    }

    #[test]
    fn empty_assembler_serializes() {
        let bytes = PdfAssembler::new().serialize().unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert_eq!(count_pages(&bytes).unwrap(), 0);
    }

    #[test]
    fn copied_pages_keep_order_and_inherit() {
        let mut asm = PdfAssembler::new();
        assert_eq!(asm.copy_all_pages("a.pdf", &sample_pdf("A", 2)).unwrap(), 2);
        assert_eq!(asm.copy_all_pages("b.pdf", &sample_pdf("B", 1)).unwrap(), 1);
        let bytes = asm.serialize().unwrap();

        let texts = page_texts(&bytes);
        assert_eq!(texts.len(), 3);
        assert!(texts[0].contains("A-0"));
        assert!(texts[1].contains("A-1"));
        assert!(texts[2].contains("B-0"));

        let doc = Document::load_mem(&bytes).unwrap();
        for id in doc.get_pages().values() {
            let page = doc.get_dictionary(*id).unwrap();
            assert!(page.has(b"MediaBox"));
            assert!(page.has(b"Resources"));
        }
    }

    #[test]
    fn garbage_is_rejected_with_name() {
        let mut asm = PdfAssembler::new();
        let err = asm.copy_all_pages("junk.pdf", b"hello world").unwrap_err();
        assert!(matches!(err, StitchError::InvalidPdf { ref name, .. } if name == "junk.pdf"));
        let err = asm.copy_all_pages("empty.pdf", b"").unwrap_err();
        assert!(matches!(err, StitchError::InvalidPdf { ref name, .. } if name == "empty.pdf"));
        let err = asm.copy_all_pages("cut.pdf", b"%PDF-1.4\n1 0 obj").unwrap_err();
        assert!(matches!(err, StitchError::InvalidPdf { .. }));
        assert_eq!(asm.page_count(), 0);
    }

    #[test]
    fn raster_page_is_a4_with_margins() {
        let mut asm = PdfAssembler::new();
        asm.append_raster_page(&chunk(200, 100.0));
        let bytes = asm.serialize().unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
        let w = mb[2].as_float().unwrap();
        let h = mb[3].as_float().unwrap();
        assert!((w - 595.28).abs() < 0.01, "width {w}");
        assert!((h - 841.89).abs() < 0.01, "height {h}");

        let content = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned();
        // 170 mm wide, 100 mm tall, 20 mm from the left, top at 20 mm from the top.
        assert!(content.contains("481.8898 0 0 283.4646 56.6929 501.7323 cm"), "{content}");
    }

    #[test]
    fn image_page_matches_requested_size() {
        let mut asm = PdfAssembler::new();
        let img = encode_rgba(&RgbaImage::from_pixel(4, 3, Rgba([9, 9, 9, 255])));
        asm.append_image_page(&img, 3.0, 2.25);
        assert_eq!(asm.page_count(), 1);
        let bytes = asm.serialize().unwrap();
        assert_eq!(count_pages(&bytes).unwrap(), 1);
    }
}
