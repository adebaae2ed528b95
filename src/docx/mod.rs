//! DOCX → HTML conversion.
//!
//! The DOCX path renders HTML, so the first step is turning the Word package
//! into markup. [`DocxToHtml`] is the seam; [`BuiltinDocxConverter`] is the
//! implementation the crate ships with. Conversion diagnostics come back as
//! [`DocxMessage`]s next to the HTML rather than as errors: a missing image
//! should not sink the whole document.

mod builtin;
mod package;
mod style_map;

pub use builtin::BuiltinDocxConverter;
pub use style_map::{HtmlTarget, StyleMap, StyleRule};

use crate::error::StitchError;
use serde::{Deserialize, Serialize};

/// Severity of a conversion diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocxMessage {
    pub severity: Severity,
    pub message: String,
}

impl DocxMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }
}

/// HTML produced from a DOCX package, plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocxHtml {
    pub html: String,
    pub messages: Vec<DocxMessage>,
}

impl DocxHtml {
    /// True when the HTML holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.html.trim().is_empty()
    }
}

/// Converts DOCX bytes into HTML using a paragraph style map.
///
/// Conversion is CPU-bound and runs on the blocking thread pool, hence the
/// `Send + Sync` bound.
pub trait DocxToHtml: Send + Sync {
    fn convert(&self, bytes: &[u8], style_map: &StyleMap) -> Result<DocxHtml, StitchError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
  <w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style>
  <w:style w:type="paragraph" w:styleId="Heading2"><w:name w:val="heading 2"/></w:style>
  <w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/></w:style>
  <w:style w:type="paragraph" w:styleId="ListParagraph"><w:name w:val="List Paragraph"/></w:style>
</w:styles>"#;

    const NUMBERING: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:numbering xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:abstractNum w:abstractNumId="0">
    <w:lvl w:ilvl="0"><w:numFmt w:val="bullet"/></w:lvl>
    <w:lvl w:ilvl="1"><w:numFmt w:val="decimal"/></w:lvl>
  </w:abstractNum>
  <w:abstractNum w:abstractNumId="1">
    <w:lvl w:ilvl="0"><w:numFmt w:val="decimal"/></w:lvl>
  </w:abstractNum>
  <w:num w:numId="1"><w:abstractNumId w:val="0"/></w:num>
  <w:num w:numId="2"><w:abstractNumId w:val="1"/></w:num>
</w:numbering>"#;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rIdImg" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
  <Relationship Id="rIdLink" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/" TargetMode="External"/>
</Relationships>"#;

    /// Knobs for [`build_docx`].
    pub(crate) struct DocxParts {
        pub body: String,
        pub omit_document: bool,
    }

    impl DocxParts {
        pub fn with_body(body: &str) -> Self {
            Self {
                body: body.to_string(),
                omit_document: false,
            }
        }
    }

    fn document_xml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
  xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
  xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
  xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
  xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">
<w:body>{body}</w:body>
</w:document>"#
        )
    }

    fn red_dot_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    /// Assemble a DOCX package with fixed styles, numbering and relationships.
    pub(crate) fn build_docx(parts: &DocxParts) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let mut add = |name: &str, data: &[u8]| {
            zip.start_file(name, options).unwrap();
            zip.write_all(data).unwrap();
        };
        if !parts.omit_document {
            add("word/document.xml", document_xml(&parts.body).as_bytes());
        }
        add("word/styles.xml", STYLES.as_bytes());
        add("word/numbering.xml", NUMBERING.as_bytes());
        add("word/_rels/document.xml.rels", RELS.as_bytes());
        add("word/media/image1.png", &red_dot_png());
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn blank_html_detection() {
        let blank = super::DocxHtml {
            html: " \n\t".into(),
            messages: vec![],
        };
        assert!(blank.is_blank());
    }
}
