//! Styling of the staged DOCX container.
//!
//! Everything the layout engine needs to paint converted DOCX HTML lives
//! here: the class the container carries, its inline style, and a stylesheet
//! whose rules are all scoped to that class so they cannot leak into the
//! host document.

use crate::host::StyleDecl;
use crate::units::CONTAINER_WIDTH_PX;

/// Class given to the staged container.
pub const CONTAINER_CLASS: &str = "pdf-stitch-docx";

/// Horizontal offset that keeps the staged container out of view.
pub const OFFSCREEN_TRANSFORM: &str = "translateX(-10000px)";

/// Z-index that puts the container above anything else in the host document.
pub const TOP_Z_INDEX: &str = "999999";

/// Stylesheet template; every selector is prefixed with `{scope}`.
const STYLESHEET_TEMPLATE: &str = r#"
{scope} {
  display: block;
  box-sizing: border-box;
  font-family: 'Times New Roman', Times, serif;
  font-size: 14pt;
  line-height: 1.6;
  color: #000000 !important;
  margin: 0;
  padding: 0;
  width: 170mm;
  max-width: 170mm;
  min-height: 1px;
}
{scope} * {
  color: inherit;
  visibility: visible !important;
  opacity: 1 !important;
}
{scope} h1 { font-size: 28pt; font-weight: bold; margin-top: 16pt; margin-bottom: 10pt; line-height: 1.3; }
{scope} h2 { font-size: 24pt; font-weight: bold; margin-top: 14pt; margin-bottom: 8pt; line-height: 1.3; }
{scope} h3 { font-size: 20pt; font-weight: bold; margin-top: 12pt; margin-bottom: 6pt; line-height: 1.4; }
{scope} h4 { font-size: 18pt; font-weight: bold; margin-top: 10pt; margin-bottom: 6pt; line-height: 1.4; }
{scope} h5 { font-size: 16pt; font-weight: bold; margin-top: 8pt; margin-bottom: 4pt; line-height: 1.5; }
{scope} h6 { font-size: 14pt; font-weight: bold; margin-top: 6pt; margin-bottom: 4pt; line-height: 1.5; }
{scope} p {
  font-size: 14pt;
  line-height: 1.6;
  margin-top: 0;
  margin-bottom: 8pt;
  text-align: left;
}
{scope} strong, {scope} b { font-weight: bold; }
{scope} em, {scope} i { font-style: italic; }
{scope} u { text-decoration: underline; }
{scope} s { text-decoration: line-through; }
{scope} ul, {scope} ol { margin-top: 8pt; margin-bottom: 8pt; padding-left: 40pt; }
{scope} li { margin-bottom: 4pt; line-height: 1.6; font-size: 14pt; }
{scope} .title {
  font-size: 32pt;
  font-weight: bold;
  text-align: center;
  margin-top: 16pt;
  margin-bottom: 16pt;
}
{scope} .subtitle {
  font-size: 16pt;
  font-style: italic;
  text-align: center;
  margin-bottom: 16pt;
}
{scope} table {
  border-collapse: collapse;
  width: 100%;
  margin-top: 8pt;
  margin-bottom: 8pt;
  font-size: 14pt;
}
{scope} td, {scope} th { border: 1px solid #000000; padding: 6pt; text-align: left; }
{scope} th { font-weight: bold; background-color: #f0f0f0; }
{scope} img { max-width: 100%; height: auto; }
{scope} p[style*="text-align: center"] { text-align: center; }
{scope} p[style*="text-align: right"] { text-align: right; }
{scope} p[style*="text-align: justify"] { text-align: justify; }
"#;

/// The stylesheet scoped to `.{class}`.
pub fn scoped_stylesheet(class: &str) -> String {
    STYLESHEET_TEMPLATE.replace("{scope}", &format!(".{class}"))
}

/// Inline style of the staged container: fixed, 643 px wide, off-screen.
pub fn container_style() -> Vec<StyleDecl> {
    let width = format!("{CONTAINER_WIDTH_PX}px");
    vec![
        StyleDecl::new("position", "fixed"),
        StyleDecl::new("left", "0"),
        StyleDecl::new("top", "0"),
        StyleDecl::new("width", width.clone()),
        StyleDecl::new("max-width", width),
        StyleDecl::new("padding", "20px"),
        StyleDecl::new("margin", "0"),
        StyleDecl::new("background-color", "white"),
        StyleDecl::new("color", "black"),
        StyleDecl::new("font-family", "'Times New Roman', Times, serif"),
        StyleDecl::new("font-size", "14pt"),
        StyleDecl::new("line-height", "1.6"),
        StyleDecl::new("visibility", "visible"),
        StyleDecl::new("opacity", "1"),
        StyleDecl::new("z-index", TOP_Z_INDEX),
        StyleDecl::new("pointer-events", "none"),
        StyleDecl::new("overflow", "visible"),
        StyleDecl::new("transform", OFFSCREEN_TRANSFORM),
    ]
}
