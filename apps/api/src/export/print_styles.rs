//! Print override stylesheets appended to every assembled document.
//!
//! The renderers never run the editor's utility-CSS JIT, so the utility classes the
//! templates use are re-declared here with explicit values. Everything is `!important`
//! so it wins over whatever the harvested CSS says.

use once_cell::sync::Lazy;

/// Base reset shared by both sanitization strategies.
const RESET_RULES: &str = r#"@page { size: A4; margin: 10mm; }
html, body {
  background: #ffffff !important;
  margin: 0 !important;
  padding: 0 !important;
  -webkit-print-color-adjust: exact !important;
  print-color-adjust: exact !important;
}
*, *::before, *::after {
  box-shadow: none !important;
  text-shadow: none !important;
  outline: none !important;
  border-radius: 0 !important;
  animation: none !important;
  transition: none !important;
  overflow: visible !important;
}
.h-screen, .min-h-screen, .max-h-screen {
  height: auto !important;
  min-height: 0 !important;
  max-height: none !important;
}
img { max-width: 100% !important; }
h1, h2, h3, li { break-inside: avoid; page-break-inside: avoid; }
"#;

/// Rules only the override strategy applies, since it leaves the markup untouched.
const OVERRIDE_RULES: &str = r#"*, *::before, *::after {
  border: none !important;
  background-color: transparent !important;
  background-image: none !important;
  backdrop-filter: none !important;
  filter: none !important;
  opacity: 1 !important;
}
html, body, #resume-preview { background-color: #ffffff !important; }
body, p, li, span, div, td, th, dt, dd, small, strong, em, a { color: #1f2937 !important; }
h1, h2, h3, h4, h5, h6 { color: #111827 !important; }
.absolute, .fixed, .sticky,
[style*="position: absolute"], [style*="position:absolute"],
[style*="position: fixed"], [style*="position:fixed"] {
  position: relative !important;
  inset: auto !important;
}
.hidden-print, .no-print, button, [role="button"], [data-export-ignore] { display: none !important; }
"#;

const TEXT_SIZES: &[(&str, &str, &str)] = &[
    ("xs", "0.75rem", "1rem"),
    ("sm", "0.875rem", "1.25rem"),
    ("base", "1rem", "1.5rem"),
    ("lg", "1.125rem", "1.75rem"),
    ("xl", "1.25rem", "1.75rem"),
    ("2xl", "1.5rem", "2rem"),
    ("3xl", "1.875rem", "2.25rem"),
    ("4xl", "2.25rem", "2.5rem"),
];

const SPACING_SCALE: &[f64] = &[
    0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0, 12.0,
];

const FONT_WEIGHTS: &[(&str, u16)] = &[
    ("normal", 400),
    ("medium", 500),
    ("semibold", 600),
    ("bold", 700),
];

/// (class prefix, CSS properties it sets)
const BOX_UTILITIES: &[(&str, &[&str])] = &[
    ("p", &["padding"]),
    ("px", &["padding-left", "padding-right"]),
    ("py", &["padding-top", "padding-bottom"]),
    ("pt", &["padding-top"]),
    ("pr", &["padding-right"]),
    ("pb", &["padding-bottom"]),
    ("pl", &["padding-left"]),
    ("m", &["margin"]),
    ("mx", &["margin-left", "margin-right"]),
    ("my", &["margin-top", "margin-bottom"]),
    ("mt", &["margin-top"]),
    ("mr", &["margin-right"]),
    ("mb", &["margin-bottom"]),
    ("ml", &["margin-left"]),
    ("gap", &["gap"]),
];

static OVERRIDE_STYLESHEET: Lazy<String> = Lazy::new(|| {
    let mut css = String::with_capacity(16 * 1024);
    css.push_str(RESET_RULES);
    css.push_str(OVERRIDE_RULES);
    css.push_str(&utility_rules());
    css
});

/// Reset only: shadows, radius, outline, animation, overflow. Used with the regex strategy.
pub fn reset_stylesheet() -> &'static str {
    RESET_RULES
}

/// Full print override: reset + flattening + utility re-declarations.
pub fn override_stylesheet() -> &'static str {
    &OVERRIDE_STYLESHEET
}

fn utility_rules() -> String {
    let mut css = String::new();

    for (name, size, line_height) in TEXT_SIZES {
        css.push_str(&format!(
            ".text-{name} {{ font-size: {size} !important; line-height: {line_height} !important; }}\n"
        ));
    }

    for (name, weight) in FONT_WEIGHTS {
        css.push_str(&format!(
            ".font-{name} {{ font-weight: {weight} !important; }}\n"
        ));
    }

    for step in SPACING_SCALE {
        let class = spacing_class(*step);
        let value = rem(*step);
        for (prefix, properties) in BOX_UTILITIES {
            let decls: String = properties
                .iter()
                .map(|p| format!("{p}: {value} !important; "))
                .collect();
            css.push_str(&format!(".{prefix}-{class} {{ {decls}}}\n"));
        }
        css.push_str(&format!(
            ".space-y-{class} > * + * {{ margin-top: {value} !important; }}\n"
        ));
        css.push_str(&format!(
            ".space-x-{class} > * + * {{ margin-left: {value} !important; }}\n"
        ));
    }

    for cols in 1..=6 {
        css.push_str(&format!(
            ".grid-cols-{cols} {{ display: grid !important; grid-template-columns: repeat({cols}, minmax(0, 1fr)) !important; }}\n"
        ));
    }
    for span in 1..=6 {
        css.push_str(&format!(
            ".col-span-{span} {{ grid-column: span {span} / span {span} !important; }}\n"
        ));
    }

    css
}

/// Class suffix for a spacing step; fractional steps are escaped (`0\.5`).
fn spacing_class(step: f64) -> String {
    if step.fract() == 0.0 {
        format!("{}", step as u32)
    } else {
        format!("{}", step).replace('.', "\\.")
    }
}

/// Spacing step to rem (one step = 0.25rem).
fn rem(step: f64) -> String {
    if step == 0.0 {
        return "0".to_string();
    }
    let formatted = format!("{:.4}", step * 0.25);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}rem")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_disables_shadows_radius_and_outline() {
        let css = reset_stylesheet();
        assert!(css.contains("box-shadow: none !important"));
        assert!(css.contains("border-radius: 0 !important"));
        assert!(css.contains("outline: none !important"));
        assert!(css.contains("overflow: visible !important"));
    }

    #[test]
    fn test_override_includes_reset() {
        assert!(override_stylesheet().starts_with(reset_stylesheet()));
    }

    #[test]
    fn test_override_flattens_backgrounds_and_positions() {
        let css = override_stylesheet();
        assert!(css.contains("background-color: transparent !important"));
        assert!(css.contains("border: none !important"));
        assert!(css.contains("position: relative !important"));
    }

    #[test]
    fn test_utility_classes_are_redeclared() {
        let css = override_stylesheet();
        assert!(css.contains(".p-4 { padding: 1rem !important; }"));
        assert!(css.contains(".px-2 { padding-left: 0.5rem !important; padding-right: 0.5rem !important; }"));
        assert!(css.contains(".mt-0\\.5 { margin-top: 0.125rem !important; }"));
        assert!(css.contains(".space-y-4 > * + * { margin-top: 1rem !important; }"));
        assert!(css.contains(".text-2xl { font-size: 1.5rem !important;"));
        assert!(css.contains("grid-template-columns: repeat(3, minmax(0, 1fr))"));
    }

    #[test]
    fn test_rem_formatting() {
        assert_eq!(rem(0.0), "0");
        assert_eq!(rem(1.0), "0.25rem");
        assert_eq!(rem(4.0), "1rem");
        assert_eq!(rem(1.5), "0.375rem");
        assert_eq!(rem(12.0), "3rem");
    }
}
