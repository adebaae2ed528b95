//! DOCX package access: the ZIP container and its auxiliary XML parts.
//!
//! `word/document.xml` is mandatory. Styles, numbering and relationships are
//! optional; a package without them simply has no style names, no list
//! formats and no images or links to resolve.

use crate::error::StitchError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";
const NUMBERING_PART: &str = "word/numbering.xml";
const RELS_PART: &str = "word/_rels/document.xml.rels";

/// Value of the attribute named `key`, unescaped.
pub(crate) fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn xml_err(part: &str, err: impl std::fmt::Display) -> StitchError {
    StitchError::DocxParse(format!("{part}: {err}"))
}

/// A relationship from `document.xml.rels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub target: String,
    pub external: bool,
}

/// An opened DOCX package.
pub struct DocxPackage {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    pub document_xml: String,
    /// Paragraph style id → display name.
    pub style_names: HashMap<String, String>,
    /// Id of the paragraph style used when a paragraph names none.
    pub default_style: Option<String>,
    /// `(numId, ilvl)` → `w:numFmt` value.
    pub list_formats: HashMap<(String, u32), String>,
    pub relationships: HashMap<String, Relationship>,
}

impl DocxPackage {
    pub fn open(bytes: &[u8]) -> Result<Self, StitchError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| StitchError::DocxParse(format!("not a ZIP package: {e}")))?;

        let document_xml = read_part(&mut archive, DOCUMENT_PART)?.ok_or_else(|| {
            StitchError::DocxParse(format!("{DOCUMENT_PART} is missing"))
        })?;

        let (style_names, default_style) = match read_part(&mut archive, STYLES_PART)? {
            Some(xml) => parse_styles(&xml)?,
            None => (HashMap::new(), None),
        };
        let list_formats = match read_part(&mut archive, NUMBERING_PART)? {
            Some(xml) => parse_numbering(&xml)?,
            None => HashMap::new(),
        };
        let relationships = match read_part(&mut archive, RELS_PART)? {
            Some(xml) => parse_relationships(&xml)?,
            None => HashMap::new(),
        };

        Ok(Self {
            archive,
            document_xml,
            style_names,
            default_style,
            list_formats,
            relationships,
        })
    }

    /// Raw bytes of the part a relationship target points at.
    ///
    /// Targets are relative to `word/`; `../x` and absolute `/word/x` forms
    /// are normalised.
    pub fn media(&mut self, target: &str) -> Option<Vec<u8>> {
        let path = resolve_target(target);
        let mut file = self.archive.by_name(&path).ok()?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf).ok()?;
        Some(buf)
    }
}

fn resolve_target(target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = vec!["word"];
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn read_part(
    archive: &mut ZipArchive<Cursor<Vec<u8>>>,
    name: &str,
) -> Result<Option<String>, StitchError> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(xml_err(name, e)),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml).map_err(|e| xml_err(name, e))?;
    Ok(Some(xml))
}

fn parse_styles(xml: &str) -> Result<(HashMap<String, String>, Option<String>), StitchError> {
    let mut reader = Reader::from_str(xml);
    let mut names = HashMap::new();
    let mut default_style = None;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:style" => {
                    current = None;
                    if attr(&e, b"w:type").as_deref() == Some("paragraph") {
                        let id = attr(&e, b"w:styleId");
                        if matches!(attr(&e, b"w:default").as_deref(), Some("1") | Some("true")) {
                            default_style = id.clone();
                        }
                        current = id;
                    }
                }
                b"w:name" => {
                    if let (Some(id), Some(name)) = (&current, attr(&e, b"w:val")) {
                        names.insert(id.clone(), name);
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.name().as_ref() == b"w:style" => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(STYLES_PART, e)),
            _ => {}
        }
    }
    Ok((names, default_style))
}

fn parse_numbering(xml: &str) -> Result<HashMap<(String, u32), String>, StitchError> {
    let mut reader = Reader::from_str(xml);
    // abstractNumId → ilvl → format
    let mut abstract_formats: HashMap<String, HashMap<u32, String>> = HashMap::new();
    // numId → abstractNumId
    let mut num_to_abstract: HashMap<String, String> = HashMap::new();

    let mut current_abstract: Option<String> = None;
    let mut current_level: Option<u32> = None;
    let mut current_num: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:abstractNum" => current_abstract = attr(&e, b"w:abstractNumId"),
                b"w:lvl" => current_level = attr(&e, b"w:ilvl").and_then(|v| v.parse().ok()),
                b"w:numFmt" => {
                    if let (Some(a), Some(l), Some(fmt)) =
                        (&current_abstract, current_level, attr(&e, b"w:val"))
                    {
                        abstract_formats.entry(a.clone()).or_default().insert(l, fmt);
                    }
                }
                b"w:num" => current_num = attr(&e, b"w:numId"),
                b"w:abstractNumId" => {
                    if let (Some(n), Some(a)) = (&current_num, attr(&e, b"w:val")) {
                        num_to_abstract.insert(n.clone(), a);
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:abstractNum" => current_abstract = None,
                b"w:lvl" => current_level = None,
                b"w:num" => current_num = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(NUMBERING_PART, e)),
            _ => {}
        }
    }

    let mut formats = HashMap::new();
    for (num, abs) in num_to_abstract {
        if let Some(levels) = abstract_formats.get(&abs) {
            for (lvl, fmt) in levels {
                formats.insert((num.clone(), *lvl), fmt.clone());
            }
        }
    }
    Ok(formats)
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, Relationship>, StitchError> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    let external = attr(&e, b"TargetMode").as_deref() == Some("External");
                    rels.insert(id, Relationship { target, external });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(RELS_PART, e)),
            _ => {}
        }
    }
    Ok(rels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styles_map_ids_to_names() {
        let xml = r#"<w:styles xmlns:w="w">
            <w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
            <w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style>
            <w:style w:type="character" w:styleId="Strong"><w:name w:val="Strong"/></w:style>
        </w:styles>"#;
        let (names, default_style) = parse_styles(xml).unwrap();
        assert_eq!(names.get("Heading1").map(String::as_str), Some("heading 1"));
        assert!(!names.contains_key("Strong"));
        assert_eq!(default_style.as_deref(), Some("Normal"));
    }

    #[test]
    fn numbering_resolves_through_abstract() {
        let xml = r#"<w:numbering xmlns:w="w">
            <w:abstractNum w:abstractNumId="0">
                <w:lvl w:ilvl="0"><w:numFmt w:val="bullet"/></w:lvl>
                <w:lvl w:ilvl="1"><w:numFmt w:val="decimal"/></w:lvl>
            </w:abstractNum>
            <w:num w:numId="5"><w:abstractNumId w:val="0"/></w:num>
        </w:numbering>"#;
        let f = parse_numbering(xml).unwrap();
        assert_eq!(f.get(&("5".to_string(), 0)).map(String::as_str), Some("bullet"));
        assert_eq!(f.get(&("5".to_string(), 1)).map(String::as_str), Some("decimal"));
    }

    #[test]
    fn relationships_flag_external() {
        let xml = r#"<Relationships xmlns="r">
            <Relationship Id="rId4" Type="image" Target="media/image1.png"/>
            <Relationship Id="rId5" Type="hyperlink" Target="https://example.com/?a=1&amp;b=2" TargetMode="External"/>
        </Relationships>"#;
        let rels = parse_relationships(xml).unwrap();
        assert!(!rels["rId4"].external);
        assert!(rels["rId5"].external);
        assert_eq!(rels["rId5"].target, "https://example.com/?a=1&b=2");
    }

    #[test]
    fn targets_resolve_relative_to_word() {
        assert_eq!(resolve_target("media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("../media/x.jpg"), "media/x.jpg");
        assert_eq!(resolve_target("/word/media/y.gif"), "word/media/y.gif");
    }

    #[test]
    fn not_a_zip_is_a_parse_error() {
        let err = DocxPackage::open(b"plain text").err().unwrap();
        assert!(matches!(err, StitchError::DocxParse(_)));
    }
}
