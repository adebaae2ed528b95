//! Paragraph-style → HTML element rules.
//!
//! Rules use the same one-line syntax as the mammoth family of converters:
//!
//! ```text
//! p[style-name='Heading 1'] => h1:fresh
//! p[style-name='Title'] => h1.title:fresh
//! ```
//!
//! Style names match case-insensitively and the first matching rule wins.

use crate::error::StitchError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static RULE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^p\[style-name='([^']+)'\]\s*=>\s*([a-z][a-z0-9]*)(?:\.([A-Za-z0-9_-]+))?(?::fresh)?$",
    )
    .unwrap()
});

/// Element a paragraph is rendered as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlTarget {
    pub tag: String,
    pub class: Option<String>,
}

impl HtmlTarget {
    pub fn new(tag: &str, class: Option<&str>) -> Self {
        Self {
            tag: tag.to_string(),
            class: class.map(str::to_string),
        }
    }

    /// Plain `<p>`.
    pub fn paragraph() -> Self {
        Self::new("p", None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRule {
    pub style_name: String,
    pub target: HtmlTarget,
}

impl fmt::Display for StyleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p[style-name='{}'] => {}", self.style_name, self.target.tag)?;
        if let Some(class) = &self.target.class {
            write!(f, ".{class}")?;
        }
        f.write_str(":fresh")
    }
}

/// Ordered list of [`StyleRule`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleMap {
    rules: Vec<StyleRule>,
}

impl Default for StyleMap {
    fn default() -> Self {
        let mut rules: Vec<StyleRule> = (1..=6)
            .map(|level| StyleRule {
                style_name: format!("Heading {level}"),
                target: HtmlTarget::new(&format!("h{level}"), None),
            })
            .collect();
        for (name, tag, class) in [
            ("List Paragraph", "p", None),
            ("Normal", "p", None),
            ("Title", "h1", Some("title")),
            ("Subtitle", "p", Some("subtitle")),
        ] {
            rules.push(StyleRule {
                style_name: name.to_string(),
                target: HtmlTarget::new(tag, class),
            });
        }
        Self { rules }
    }
}

impl StyleMap {
    pub fn from_rules(rules: Vec<StyleRule>) -> Self {
        Self { rules }
    }

    /// Parse one rule per line. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, StitchError> {
        let mut rules = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let caps = RULE_RE.captures(line).ok_or_else(|| {
                StitchError::InvalidConfig(format!(
                    "style map line {}: cannot parse '{}'\n\
Expected: p[style-name='Style Name'] => tag[.class][:fresh]",
                    n + 1,
                    line
                ))
            })?;
            rules.push(StyleRule {
                style_name: caps[1].to_string(),
                target: HtmlTarget::new(&caps[2], caps.get(3).map(|m| m.as_str())),
            });
        }
        Ok(Self { rules })
    }

    /// These rules first, then the built-in defaults.
    pub fn with_defaults(mut self) -> Self {
        self.rules.extend(StyleMap::default().rules);
        self
    }

    /// First rule whose style name equals `style_name`, ignoring case.
    pub fn lookup(&self, style_name: &str) -> Option<&HtmlTarget> {
        self.rules
            .iter()
            .find(|r| r.style_name.eq_ignore_ascii_case(style_name))
            .map(|r| &r.target)
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
