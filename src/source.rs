//! Source files handed to the pipeline.
//!
//! A [`SourceFile`] is an immutable named byte blob tagged with a declared
//! [`SourceKind`]. The pipeline dispatches on the declared kind only; working
//! out the kind from a file name or MIME type is the caller's job, with
//! [`SourceKind::detect`] as a convenience for callers that have nothing
//! better.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared content kind of a [`SourceFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Portable Document Format.
    Pdf,
    /// Binary Word 97–2003 document (`.doc`). Always rejected.
    LegacyWord,
    /// Office Open XML Word document (`.docx`).
    Word,
    /// JPEG image.
    Jpeg,
    /// PNG image.
    Png,
}

impl SourceKind {
    /// Detect a kind from a file name and an optional MIME type.
    ///
    /// Extension wins over MIME type; returns `None` for anything the
    /// pipeline has no path for.
    pub fn detect(name: &str, mime: Option<&str>) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let by_ext = match lower.rsplit_once('.').map(|(_, ext)| ext) {
            Some("pdf") => Some(SourceKind::Pdf),
            Some("doc") => Some(SourceKind::LegacyWord),
            Some("docx") => Some(SourceKind::Word),
            Some("jpg") | Some("jpeg") => Some(SourceKind::Jpeg),
            Some("png") => Some(SourceKind::Png),
            _ => None,
        };
        by_ext.or_else(|| match mime? {
            "application/pdf" => Some(SourceKind::Pdf),
            "application/msword" => Some(SourceKind::LegacyWord),
            "image/jpeg" => Some(SourceKind::Jpeg),
            "image/png" => Some(SourceKind::Png),
            m if m.contains("wordprocessingml") => Some(SourceKind::Word),
            _ => None,
        })
    }

    /// Detect a kind from leading magic bytes.
    ///
    /// ZIP containers are reported as [`SourceKind::Word`]; the DOCX reader
    /// rejects other ZIP payloads later.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(SourceKind::Pdf)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(SourceKind::Jpeg)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(SourceKind::Png)
        } else if bytes.starts_with(b"PK\x03\x04") {
            Some(SourceKind::Word)
        } else if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
            Some(SourceKind::LegacyWord)
        } else {
            None
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::Pdf => "PDF",
            SourceKind::LegacyWord => "Word 97-2003",
            SourceKind::Word => "Word",
            SourceKind::Jpeg => "JPEG",
            SourceKind::Png => "PNG",
        };
        f.write_str(s)
    }
}

/// A named byte blob with a declared kind.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub kind: SourceKind,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, kind: SourceKind, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            kind,
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_by_extension() {
        assert_eq!(SourceKind::detect("A.PDF", None), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::detect("old.doc", None), Some(SourceKind::LegacyWord));
        assert_eq!(SourceKind::detect("new.docx", None), Some(SourceKind::Word));
        assert_eq!(SourceKind::detect("photo.jpg", None), Some(SourceKind::Jpeg));
        assert_eq!(SourceKind::detect("photo.jpeg", None), Some(SourceKind::Jpeg));
        assert_eq!(SourceKind::detect("scan.png", None), Some(SourceKind::Png));
        assert_eq!(SourceKind::detect("notes.txt", None), None);
    }

    #[test]
    fn detect_falls_back_to_mime() {
        let docx_mime = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
        assert_eq!(SourceKind::detect("upload", Some(docx_mime)), Some(SourceKind::Word));
        assert_eq!(SourceKind::detect("blob", Some("image/jpeg")), Some(SourceKind::Jpeg));
        assert_eq!(SourceKind::detect("blob", Some("text/plain")), None);
    }

    #[test]
    fn sniff_magic_bytes() {
        assert_eq!(SourceKind::sniff(b"%PDF-1.7\n"), Some(SourceKind::Pdf));
        assert_eq!(SourceKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(SourceKind::Jpeg));
        assert_eq!(SourceKind::sniff(b"PK\x03\x04rest"), Some(SourceKind::Word));
        assert_eq!(SourceKind::sniff(b""), None);
    }

    #[test]
    fn debug_hides_bytes() {
        let f = SourceFile::new("a.pdf", SourceKind::Pdf, vec![0u8; 4096]);
        let dbg = format!("{f:?}");
        assert!(dbg.contains("len: 4096"));
        assert!(!dbg.contains("0, 0, 0"));
    }
}
