//! DOM Sanitizer — clones the export target and strips what does not print.
//!
//! Two strategies exist because backends tolerate different amounts of residual styling:
//! - `OverrideStylesheet` leaves the markup alone and relies on the print override sheet.
//! - `RegexStrip` rewrites class lists and inline styles directly on the serialized markup,
//!   for backends that cannot take an injected stylesheet.
//!
//! Both strategies drop scripts and inline event handlers and absolutize relative asset URLs.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::export::ExportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeStrategy {
    OverrideStylesheet,
    RegexStrip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedMarkup {
    pub html: String,
    pub strategy: SanitizeStrategy,
}

static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<noscript\b[^>]*>.*?</noscript\s*>")
        .expect("static regex")
});

static OPEN_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([a-zA-Z][a-zA-Z0-9-]*)((?:[^>\x22']|\x22[^\x22]*\x22|'[^']*')*?)(/?)>")
        .expect("static regex")
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("static regex")
});

/// Class tokens removed by the regex strategy. Variant prefixes (`md:`, `hover:`) are allowed.
static STRIPPED_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[a-z0-9-]+:)*(?:(?:shadow|ring|outline|border|rounded|overflow|transition|animate|backdrop|opacity|blur|drop-shadow)(?:-.*)?|fixed|absolute|sticky|hover:.*|focus:.*)$",
    )
    .expect("static regex")
});

static GRAY_BACKGROUND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9-]+:)*bg-(?:gray|slate|zinc|neutral|stone)-\d+(?:/\d+)?$")
        .expect("static regex")
});

const STRIPPED_STYLE_PROPERTIES: &[&str] = &[
    "box-shadow",
    "text-shadow",
    "border-radius",
    "outline",
    "animation",
    "transition",
    "filter",
    "backdrop-filter",
];

// ────────────────────────────────────────────────────────────────────────────
// Target location
// ────────────────────────────────────────────────────────────────────────────

/// Returns the outer HTML of the first element matching `selector`.
///
/// Fails with `TargetMissing` when nothing matches or the element has neither
/// text nor child elements. An empty subtree is never rendered.
pub fn extract_target(page_html: &str, selector: &str) -> Result<String, ExportError> {
    let sel = Selector::parse(selector)
        .map_err(|e| ExportError::InvalidRequest(format!("bad target selector `{selector}`: {e}")))?;
    let doc = Html::parse_document(page_html);

    let target = doc.select(&sel).next().ok_or_else(|| {
        ExportError::TargetMissing(format!("no element matches `{selector}`"))
    })?;

    let has_text = target.text().any(|t| !t.trim().is_empty());
    let has_children = target.children().any(|c| c.value().is_element());
    if !has_text && !has_children {
        return Err(ExportError::TargetMissing(format!(
            "element `{selector}` is empty"
        )));
    }

    Ok(target.html())
}

// ────────────────────────────────────────────────────────────────────────────
// Sanitization
// ────────────────────────────────────────────────────────────────────────────

/// Sanitizes the cloned target markup with the given strategy.
pub fn sanitize(target_html: &str, strategy: SanitizeStrategy, base_url: Option<&Url>) -> SanitizedMarkup {
    let without_scripts = SCRIPT_BLOCK.replace_all(target_html, "");
    let html = OPEN_TAG
        .replace_all(&without_scripts, |caps: &Captures| rewrite_tag(caps, strategy, base_url))
        .into_owned();
    SanitizedMarkup { html, strategy }
}

fn rewrite_tag(caps: &Captures, strategy: SanitizeStrategy, base_url: Option<&Url>) -> String {
    let name = &caps[1];
    let self_closing = !caps[3].is_empty();

    let mut out = String::with_capacity(caps[0].len());
    out.push('<');
    out.push_str(name);

    for attr in ATTRIBUTE.captures_iter(&caps[2]) {
        let attr_name = attr[1].to_string();
        let lower = attr_name.to_ascii_lowercase();
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map(|m| m.as_str().to_string());

        if lower.starts_with("on") {
            continue;
        }

        let value = match (lower.as_str(), value) {
            ("src" | "href" | "poster", Some(v)) => Some(absolutize(&v, base_url)),
            ("class", Some(v)) if strategy == SanitizeStrategy::RegexStrip => {
                let classes = strip_classes(&v);
                if classes.is_empty() {
                    continue;
                }
                Some(classes)
            }
            ("style", Some(v)) if strategy == SanitizeStrategy::RegexStrip => {
                let style = strip_style_declarations(&v);
                if style.is_empty() {
                    continue;
                }
                Some(style)
            }
            (_, v) => v,
        };

        out.push(' ');
        out.push_str(&attr_name);
        if let Some(v) = value {
            out.push_str("=\"");
            out.push_str(&v.replace('"', "&quot;"));
            out.push('"');
        }
    }

    if self_closing {
        out.push_str(" /");
    }
    out.push('>');
    out
}

/// Drops shadow/ring/outline/border/rounded/overflow-style tokens and turns gray
/// backgrounds white. Token order is preserved; duplicates collapse.
pub fn strip_classes(class_list: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for token in class_list.split_whitespace() {
        let token = if GRAY_BACKGROUND.is_match(token) {
            "bg-white"
        } else if STRIPPED_CLASS.is_match(token) {
            continue;
        } else {
            token
        };
        if !kept.contains(&token) {
            kept.push(token);
        }
    }
    kept.join(" ")
}

/// Removes shadow/radius/animation declarations from an inline `style` attribute.
/// `position: absolute|fixed` becomes `relative` so paginated content is not clipped.
pub fn strip_style_declarations(style: &str) -> String {
    style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim();
            if STRIPPED_STYLE_PROPERTIES
                .iter()
                .any(|p| prop == *p || prop.starts_with(&format!("{p}-")))
            {
                return None;
            }
            if prop == "overflow" || prop.starts_with("overflow-") {
                return None;
            }
            if prop == "position" && matches!(value, "absolute" | "fixed" | "sticky") {
                return Some("position: relative".to_string());
            }
            Some(format!("{prop}: {value}"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn absolutize(value: &str, base_url: Option<&Url>) -> String {
    let trimmed = value.trim();
    let Some(base) = base_url else {
        return value.to_string();
    };
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return value.to_string();
    }
    match Url::parse(trimmed) {
        Ok(_) => value.to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .join(trimmed)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| value.to_string()),
        Err(_) => value.to_string(),
    }
}
