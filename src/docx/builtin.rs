//! Built-in DOCX → HTML conversion.
//!
//! `document.xml` is read once into a small block model (paragraphs and
//! tables of paragraphs), which is then rendered to HTML. Paragraph styles
//! are resolved to display names through `styles.xml` and mapped to elements
//! through the [`StyleMap`]; numbered paragraphs become list items.

use super::package::{attr, DocxPackage};
use super::style_map::{HtmlTarget, StyleMap};
use super::{DocxHtml, DocxMessage, DocxToHtml};
use crate::error::StitchError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Write as _;

// ── Block model ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RunFormat {
    bold: bool,
    italic: bool,
    underline: bool,
    strike: bool,
    superscript: bool,
    subscript: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Inline {
    Text(String, RunFormat),
    Break,
    Tab,
    Image { rel_id: String, alt: Option<String> },
    Link { href: Option<String>, children: Vec<Inline> },
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Paragraph {
    style_id: Option<String>,
    align: Option<String>,
    numbering: Option<(String, u32)>,
    inlines: Vec<Inline>,
}

impl Paragraph {
    fn is_empty(&self) -> bool {
        fn visible(inlines: &[Inline]) -> bool {
            inlines.iter().any(|i| match i {
                Inline::Text(t, _) => !t.trim().is_empty(),
                Inline::Image { .. } => true,
                Inline::Link { children, .. } => visible(children),
                Inline::Break | Inline::Tab => false,
            })
        }
        !visible(&self.inlines)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Paragraph(Paragraph),
    Table(Vec<Vec<Vec<Block>>>),
}

/// Table under construction: rows → cells → blocks.
#[derive(Default)]
struct TableBuilder {
    rows: Vec<Vec<Vec<Block>>>,
}

impl TableBuilder {
    fn current_cell(&mut self) -> Option<&mut Vec<Block>> {
        self.rows.last_mut().and_then(|r| r.last_mut())
    }
}

// ── Parser ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Parser {
    body: Vec<Block>,
    tables: Vec<TableBuilder>,
    paragraph: Option<Paragraph>,
    /// Paragraphs interrupted by a text box, with their `links` depth.
    outer: Vec<(Paragraph, usize)>,
    /// Text-box blocks, emitted after the enclosing paragraph closes.
    boxed: Vec<Block>,
    link_base: usize,
    run: RunFormat,
    in_ppr: bool,
    in_rpr: bool,
    in_text: bool,
    pending_num_id: Option<String>,
    pending_ilvl: u32,
    links: Vec<(Option<String>, Vec<Inline>)>,
    drawing_alt: Option<String>,
}

fn is_on(e: &BytesStart<'_>) -> bool {
    !matches!(
        attr(e, b"w:val").as_deref(),
        Some("0") | Some("false") | Some("off") | Some("none")
    )
}

impl Parser {
    fn push_inline(&mut self, inline: Inline) {
        if self.links.len() > self.link_base {
            if let Some((_, children)) = self.links.last_mut() {
                children.push(inline);
            }
        } else if let Some(p) = self.paragraph.as_mut() {
            p.inlines.push(inline);
        }
    }

    fn push_block(&mut self, block: Block) {
        match self.tables.last_mut().and_then(TableBuilder::current_cell) {
            Some(cell) => cell.push(block),
            None => self.body.push(block),
        }
    }

    fn start(&mut self, e: &BytesStart<'_>, empty: bool, package: &DocxPackage) {
        match e.name().as_ref() {
            b"w:p" => {
                if let Some(open) = self.paragraph.take() {
                    self.outer.push((open, self.link_base));
                    self.link_base = self.links.len();
                }
                self.paragraph = Some(Paragraph::default());
                if empty {
                    self.end_paragraph();
                }
            }
            b"w:pPr" => self.in_ppr = !empty,
            b"w:rPr" => self.in_rpr = !empty,
            b"w:pStyle" if self.in_ppr => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.style_id = attr(e, b"w:val");
                }
            }
            b"w:jc" if self.in_ppr && !self.in_rpr => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.align = attr(e, b"w:val");
                }
            }
            b"w:ilvl" if self.in_ppr => {
                self.pending_ilvl = attr(e, b"w:val").and_then(|v| v.parse().ok()).unwrap_or(0);
            }
            b"w:numId" if self.in_ppr => self.pending_num_id = attr(e, b"w:val"),
            b"w:r" => self.run = RunFormat::default(),
            b"w:b" if self.in_rpr && !self.in_ppr => self.run.bold = is_on(e),
            b"w:i" if self.in_rpr && !self.in_ppr => self.run.italic = is_on(e),
            b"w:u" if self.in_rpr && !self.in_ppr => self.run.underline = is_on(e),
            b"w:strike" | b"w:dstrike" if self.in_rpr && !self.in_ppr => self.run.strike = is_on(e),
            b"w:vertAlign" if self.in_rpr && !self.in_ppr => {
                let v = attr(e, b"w:val");
                self.run.superscript = v.as_deref() == Some("superscript");
                self.run.subscript = v.as_deref() == Some("subscript");
            }
            b"w:t" => self.in_text = !empty,
            b"w:br" => {
                if matches!(attr(e, b"w:type").as_deref(), None | Some("textWrapping")) {
                    self.push_inline(Inline::Break);
                }
            }
            b"w:tab" if !self.in_ppr => self.push_inline(Inline::Tab),
            b"w:hyperlink" => {
                let href = match (attr(e, b"r:id"), attr(e, b"w:anchor")) {
                    (Some(id), _) => package
                        .relationships
                        .get(&id)
                        .filter(|r| r.external)
                        .map(|r| r.target.clone()),
                    (None, Some(anchor)) => Some(format!("#{anchor}")),
                    (None, None) => None,
                };
                if empty {
                    return;
                }
                self.links.push((href, Vec::new()));
            }
            b"wp:docPr" => {
                self.drawing_alt = attr(e, b"descr")
                    .filter(|d| !d.trim().is_empty())
                    .or_else(|| attr(e, b"title").filter(|t| !t.trim().is_empty()));
            }
            b"a:blip" => {
                if let Some(rel_id) = attr(e, b"r:embed") {
                    let alt = self.drawing_alt.clone();
                    self.push_inline(Inline::Image { rel_id, alt });
                }
            }
            b"w:tbl" if !empty => self.tables.push(TableBuilder::default()),
            b"w:tr" => {
                if let Some(t) = self.tables.last_mut() {
                    t.rows.push(Vec::new());
                }
            }
            b"w:tc" => {
                if let Some(row) = self.tables.last_mut().and_then(|t| t.rows.last_mut()) {
                    row.push(Vec::new());
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, name: &[u8]) {
        match name {
            b"w:p" => self.end_paragraph(),
            b"w:pPr" => {
                self.in_ppr = false;
                if let (Some(p), Some(num_id)) = (self.paragraph.as_mut(), self.pending_num_id.take()) {
                    // numId 0 explicitly removes numbering.
                    if num_id != "0" {
                        p.numbering = Some((num_id, self.pending_ilvl));
                    }
                }
                self.pending_ilvl = 0;
            }
            b"w:rPr" => self.in_rpr = false,
            b"w:r" => self.run = RunFormat::default(),
            b"w:t" => self.in_text = false,
            b"w:hyperlink" => {
                if let Some((href, children)) = self.links.pop() {
                    self.push_inline(Inline::Link { href, children });
                }
            }
            b"w:drawing" | b"w:pict" => self.drawing_alt = None,
            b"w:tbl" => {
                if let Some(table) = self.tables.pop() {
                    self.push_block(Block::Table(table.rows));
                }
            }
            _ => {}
        }
    }

    fn end_paragraph(&mut self) {
        // Unclosed hyperlinks cannot span paragraphs.
        while self.links.len() > self.link_base {
            if let Some((href, children)) = self.links.pop() {
                self.push_inline(Inline::Link { href, children });
            }
        }
        let Some(p) = self.paragraph.take() else {
            return;
        };
        match self.outer.pop() {
            Some((open, base)) => {
                self.boxed.push(Block::Paragraph(p));
                self.paragraph = Some(open);
                self.link_base = base;
            }
            None => {
                self.push_block(Block::Paragraph(p));
                for block in std::mem::take(&mut self.boxed) {
                    self.push_block(block);
                }
            }
        }
    }

    fn text(&mut self, text: &str) {
        if self.in_text && self.paragraph.is_some() {
            self.push_inline(Inline::Text(text.to_string(), self.run));
        }
    }
}

fn parse_document(package: &DocxPackage) -> Result<Vec<Block>, StitchError> {
    let mut reader = Reader::from_str(&package.document_xml);
    let mut parser = Parser::default();
    // Depth inside an `mc:Choice`; only the `mc:Fallback` branch is read.
    let mut skip = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) if skip > 0 => skip += 1,
            Ok(Event::End(_)) if skip > 0 => skip -= 1,
            Ok(Event::Empty(_) | Event::Text(_) | Event::CData(_)) if skip > 0 => {}
            Ok(Event::Start(e)) if e.name().as_ref() == b"mc:Choice" => skip = 1,
            Ok(Event::Start(e)) => parser.start(&e, false, package),
            Ok(Event::Empty(e)) => parser.start(&e, true, package),
            Ok(Event::End(e)) => parser.end(e.name().as_ref()),
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| StitchError::DocxParse(format!("word/document.xml: {e}")))?;
                parser.text(&text);
            }
            Ok(Event::CData(t)) => parser.text(&String::from_utf8_lossy(&t)),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(StitchError::DocxParse(format!(
                    "word/document.xml at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    // Tolerate truncated markup: flush whatever is still open.
    while parser.paragraph.is_some() {
        parser.end_paragraph();
    }
    while let Some(table) = parser.tables.pop() {
        parser.push_block(Block::Table(table.rows));
    }
    Ok(parser.body)
}

// ── HTML rendering ───────────────────────────────────────────────────────

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn image_mime(target: &str) -> &'static str {
    match target.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("webp") => "image/webp",
        Some("emf") => "image/x-emf",
        Some("wmf") => "image/x-wmf",
        _ => "application/octet-stream",
    }
}

fn alignment_style(align: Option<&str>) -> Option<&'static str> {
    match align? {
        "center" => Some("text-align: center"),
        "right" | "end" => Some("text-align: right"),
        "both" | "distribute" => Some("text-align: justify"),
        _ => None,
    }
}

struct Renderer<'a> {
    package: &'a mut DocxPackage,
    style_map: &'a StyleMap,
    messages: Vec<DocxMessage>,
    html: String,
}

impl Renderer<'_> {
    fn style_name(&self, p: &Paragraph) -> Option<(String, String)> {
        let id = p.style_id.clone().or_else(|| self.package.default_style.clone())?;
        let name = self
            .package
            .style_names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.clone());
        Some((id, name))
    }

    fn target(&mut self, p: &Paragraph) -> HtmlTarget {
        let Some((id, name)) = self.style_name(p) else {
            return HtmlTarget::paragraph();
        };
        let style_map = self.style_map;
        match style_map.lookup(&name) {
            Some(t) => t.clone(),
            None => {
                let msg = format!("Unrecognised paragraph style: '{name}' (Style ID: {id})");
                if !self.messages.iter().any(|m| m.message == msg) {
                    self.messages.push(DocxMessage::warning(msg));
                }
                HtmlTarget::paragraph()
            }
        }
    }

    fn numbering_ignored(&mut self, p: &Paragraph, target: &HtmlTarget) {
        let name = self.style_name(p).map(|(_, name)| name).unwrap_or_default();
        let msg = format!(
            "Numbering ignored on '{name}' paragraph, rendered as <{}>",
            target.tag
        );
        if !self.messages.iter().any(|m| m.message == msg) {
            self.messages.push(DocxMessage::info(msg));
        }
    }

    fn list_tag(&self, num_id: &str, level: u32) -> &'static str {
        match self.package.list_formats.get(&(num_id.to_string(), level)) {
            Some(fmt) if fmt == "bullet" => "ul",
            Some(_) => "ol",
            None => "ul",
        }
    }

    fn blocks(&mut self, blocks: &[Block]) {
        // Open lists, innermost last; each has an open <li>.
        let mut open: Vec<(&'static str, u32)> = Vec::new();

        for block in blocks {
            if let Block::Paragraph(p) = block {
                if p.is_empty() {
                    continue;
                }
            }

            // Numbering only turns plain paragraphs into list items; a
            // numbered heading stays a heading.
            let list_item = match block {
                Block::Paragraph(p) => match &p.numbering {
                    Some((num_id, level)) => {
                        let target = self.target(p);
                        if target.tag == "p" {
                            Some((self.list_tag(num_id, *level), *level))
                        } else {
                            self.numbering_ignored(p, &target);
                            None
                        }
                    }
                    None => None,
                },
                Block::Table(_) => None,
            };

            match list_item {
                Some((tag, level)) => {
                    while open.last().is_some_and(|(_, l)| *l > level) {
                        if let Some((t, _)) = open.pop() {
                            let _ = write!(self.html, "</li></{t}>");
                        }
                    }
                    match open.last() {
                        Some((t, l)) if *l == level && *t == tag => self.html.push_str("</li><li>"),
                        Some((t, l)) if *l == level => {
                            let _ = write!(self.html, "</li></{t}><{tag}><li>");
                            open.pop();
                            open.push((tag, level));
                        }
                        _ => {
                            let _ = write!(self.html, "<{tag}><li>");
                            open.push((tag, level));
                        }
                    }
                    if let Block::Paragraph(p) = block {
                        self.inlines(&p.inlines);
                    }
                }
                None => {
                    while let Some((t, _)) = open.pop() {
                        let _ = write!(self.html, "</li></{t}>");
                    }
                    match block {
                        Block::Paragraph(p) => self.paragraph(p),
                        Block::Table(rows) => self.table(rows),
                    }
                }
            }
        }

        while let Some((t, _)) = open.pop() {
            let _ = write!(self.html, "</li></{t}>");
        }
    }

    fn paragraph(&mut self, p: &Paragraph) {
        let target = self.target(p);
        let _ = write!(self.html, "<{}", target.tag);
        if let Some(class) = &target.class {
            let _ = write!(self.html, " class=\"{}\"", escape(class));
        }
        if let Some(style) = alignment_style(p.align.as_deref()) {
            let _ = write!(self.html, " style=\"{style}\"");
        }
        self.html.push('>');
        self.inlines(&p.inlines);
        let _ = write!(self.html, "</{}>", target.tag);
    }

    fn table(&mut self, rows: &[Vec<Vec<Block>>]) {
        self.html.push_str("<table>");
        for row in rows {
            self.html.push_str("<tr>");
            for cell in row {
                self.html.push_str("<td>");
                self.blocks(cell);
                self.html.push_str("</td>");
            }
            self.html.push_str("</tr>");
        }
        self.html.push_str("</table>");
    }

    fn inlines(&mut self, inlines: &[Inline]) {
        for inline in inlines {
            match inline {
                Inline::Text(text, fmt) => self.text(text, fmt),
                Inline::Break => self.html.push_str("<br />"),
                Inline::Tab => self.html.push('\t'),
                Inline::Image { rel_id, alt } => self.image(rel_id, alt.as_deref()),
                Inline::Link { href, children } => match href {
                    Some(href) => {
                        let _ = write!(self.html, "<a href=\"{}\">", escape(href));
                        self.inlines(children);
                        self.html.push_str("</a>");
                    }
                    None => self.inlines(children),
                },
            }
        }
    }

    fn text(&mut self, text: &str, fmt: &RunFormat) {
        let wrappers: Vec<&str> = [
            (fmt.bold, "strong"),
            (fmt.italic, "em"),
            (fmt.underline, "u"),
            (fmt.strike, "s"),
            (fmt.superscript, "sup"),
            (fmt.subscript, "sub"),
        ]
        .into_iter()
        .filter_map(|(on, tag)| on.then_some(tag))
        .collect();

        for tag in &wrappers {
            let _ = write!(self.html, "<{tag}>");
        }
        self.html.push_str(&escape(text));
        for tag in wrappers.iter().rev() {
            let _ = write!(self.html, "</{tag}>");
        }
    }

    fn image(&mut self, rel_id: &str, alt: Option<&str>) {
        let Some(rel) = self.package.relationships.get(rel_id).cloned() else {
            self.messages.push(DocxMessage::error(format!(
                "Image relationship '{rel_id}' not found"
            )));
            return;
        };
        if rel.external {
            self.messages.push(DocxMessage::warning(format!(
                "Linked image '{}' was not embedded",
                rel.target
            )));
            return;
        }
        let Some(bytes) = self.package.media(&rel.target) else {
            self.messages.push(DocxMessage::error(format!(
                "Could not find image file '{}' for relationship '{rel_id}'",
                rel.target
            )));
            return;
        };
        let _ = write!(
            self.html,
            "<img src=\"data:{};base64,{}\"",
            image_mime(&rel.target),
            STANDARD.encode(bytes)
        );
        if let Some(alt) = alt {
            let _ = write!(self.html, " alt=\"{}\"", escape(alt));
        }
        self.html.push_str(" />");
    }
}

/// DOCX → HTML converter backed by `zip` and `quick-xml`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinDocxConverter;

impl DocxToHtml for BuiltinDocxConverter {
    fn convert(&self, bytes: &[u8], style_map: &StyleMap) -> Result<DocxHtml, StitchError> {
        let mut package = DocxPackage::open(bytes)?;
        let blocks = parse_document(&package)?;

        let mut renderer = Renderer {
            package: &mut package,
            style_map,
            messages: Vec::new(),
            html: String::new(),
        };
        renderer.blocks(&blocks);

        Ok(DocxHtml {
            html: renderer.html,
            messages: renderer.messages,
        })
    }
}
