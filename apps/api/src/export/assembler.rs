//! Document Assembler — one self-contained HTML document per export attempt.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::export::harvester::HeadMetadata;
use crate::export::print_styles::{override_stylesheet, reset_stylesheet};
use crate::export::sanitizer::{SanitizeStrategy, SanitizedMarkup};

static STYLE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(style)").expect("static regex"));

/// Immutable assembled document. Built once, consumed by a backend, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledDocument {
    html: String,
    head: HeadMetadata,
    css: String,
    body: String,
    strategy: SanitizeStrategy,
}

impl AssembledDocument {
    /// The complete `<!DOCTYPE html>` document.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn head(&self) -> &HeadMetadata {
        &self.head
    }

    /// Harvested CSS followed by the print override sheet.
    pub fn css(&self) -> &str {
        &self.css
    }

    /// Sanitized body markup.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn strategy(&self) -> SanitizeStrategy {
        self.strategy
    }
}

/// Combines head metadata, harvested CSS, the override sheet for the markup's
/// strategy, and the sanitized body. Deterministic for identical inputs.
pub fn assemble(head: &HeadMetadata, markup: &SanitizedMarkup, harvested_css: &str) -> AssembledDocument {
    let print_css = match markup.strategy {
        SanitizeStrategy::OverrideStylesheet => override_stylesheet(),
        SanitizeStrategy::RegexStrip => reset_stylesheet(),
    };

    let mut css = neutralize_style_close(harvested_css);
    if !css.is_empty() && !css.ends_with('\n') {
        css.push('\n');
    }
    css.push_str(print_css);

    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"{charset}\">\n<meta name=\"viewport\" content=\"{viewport}\">\n<title>{title}</title>\n<style>\n{harvested}\n</style>\n<style media=\"all\">\n{print}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        charset = escape_html(&head.charset),
        viewport = escape_html(&head.viewport),
        title = escape_html(&head.title),
        harvested = neutralize_style_close(harvested_css),
        print = print_css,
        body = markup.html,
    );

    AssembledDocument {
        html,
        head: head.clone(),
        css,
        body: markup.html.clone(),
        strategy: markup.strategy,
    }
}

/// Prevents harvested CSS from closing the surrounding `<style>` element early.
fn neutralize_style_close(css: &str) -> String {
    STYLE_CLOSE.replace_all(css, r"<\/$1").into_owned()
}

/// Minimal HTML text/attribute escaping.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
