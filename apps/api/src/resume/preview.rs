//! Preview markup for a stored résumé.
//!
//! Produces the same kind of page the editor shows: a gray page background, a centered
//! container and the white `#resume-preview` card. The export pipeline consumes this page
//! exactly like a snapshot sent by the editor. Output depends only on the input.

use crate::export::assembler::escape_html;
use crate::export::DEFAULT_TARGET_SELECTOR;
use crate::models::resume::{
    ColorScheme, FontSizeTier, ResumeDocument, SpacingTier, StoredResume, TemplateId,
};

/// Base styles of the preview page, harvested along with the page like any inline sheet.
const PAGE_CSS: &str = r#"
body { margin: 0; background: #f3f4f6; font-family: var(--resume-font), sans-serif; color: #1f2937; }
.preview-container { max-width: 56rem; margin: 0 auto; padding: 2rem 1rem; }
.resume-card { background: #ffffff; box-shadow: 0 10px 25px rgba(0,0,0,0.15); border-radius: 0.75rem; }
.resume-card h1 { font-size: 1.875em; line-height: 1.2; margin: 0; }
.resume-card h2 { font-size: 1.1em; text-transform: uppercase; letter-spacing: 0.05em; margin: 0 0 0.5em; color: var(--resume-accent); }
.resume-card h3 { font-size: 1em; margin: 0; }
.resume-card ul { margin: 0.25em 0 0 1.25em; padding: 0; }
.resume-card .meta { color: #4b5563; font-size: 0.875em; }
.resume-card .grid-sidebar { display: grid; grid-template-columns: 1fr 2fr; gap: 2rem; }
.resume-card .header-band { background: var(--resume-accent); color: #ffffff; }
.resume-card .header-band h1, .resume-card .header-band .meta { color: #ffffff; }
.resume-card .timeline > div { border-left: 2px solid var(--resume-accent); padding-left: 1rem; }
.resume-card img.photo { width: 96px; height: 96px; object-fit: cover; border-radius: 9999px; }
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Classic,
    Sidebar,
    Banner,
    Minimal,
    Compact,
    Timeline,
}

fn layout_for(template: TemplateId) -> Layout {
    match template {
        TemplateId::TemplateA => Layout::Classic,
        TemplateId::TemplateB => Layout::Sidebar,
        TemplateId::TemplateC => Layout::Banner,
        TemplateId::TemplateD => Layout::Minimal,
        TemplateId::TemplateE => Layout::Compact,
        TemplateId::TemplateF => Layout::Timeline,
    }
}

fn font_class(tier: FontSizeTier) -> &'static str {
    match tier {
        FontSizeTier::Small => "text-sm",
        FontSizeTier::Medium => "text-base",
        FontSizeTier::Large => "text-lg",
    }
}

fn spacing_classes(tier: SpacingTier, layout: Layout) -> (&'static str, &'static str) {
    let (padding, stack) = match tier {
        SpacingTier::Compact => ("p-6", "space-y-3"),
        SpacingTier::Normal => ("p-8", "space-y-4"),
        SpacingTier::Relaxed => ("p-10", "space-y-6"),
    };
    if layout == Layout::Compact {
        return ("p-6", "space-y-2");
    }
    (padding, stack)
}

fn scheme_class(scheme: ColorScheme) -> &'static str {
    match scheme {
        ColorScheme::Blue => "scheme-blue",
        ColorScheme::Green => "scheme-green",
        ColorScheme::Purple => "scheme-purple",
        ColorScheme::Red => "scheme-red",
        ColorScheme::Gray => "scheme-gray",
        ColorScheme::Teal => "scheme-teal",
    }
}

/// Full preview page for `stored`, with the card under the default target id.
pub fn render_page(stored: &StoredResume) -> String {
    let doc = &stored.resume_data;
    let settings = &stored.settings;
    let layout = layout_for(settings.template);
    let (padding, stack) = spacing_classes(settings.spacing, layout);
    let title = match doc.personal_info.full_name() {
        name if name.is_empty() => "Resume".to_string(),
        name => format!("{name} - Resume"),
    };

    let card_id = DEFAULT_TARGET_SELECTOR.trim_start_matches('#');
    let card_classes = format!(
        "resume-card {} {} {} shadow-xl rounded-xl",
        settings.template.as_str(),
        font_class(settings.font_size),
        scheme_class(settings.color_scheme),
    );
    let card_style = format!(
        "--resume-accent: {}; --resume-font: '{}'",
        settings.color_scheme.accent_hex(),
        escape_html(settings.font_family.trim()),
    );

    let photo = match (&settings.photo_url, settings.show_photo) {
        (Some(url), true) if !url.trim().is_empty() => format!(
            "<img class=\"photo\" src=\"{}\" alt=\"{}\">",
            escape_html(url.trim()),
            escape_html(&doc.personal_info.full_name())
        ),
        _ => String::new(),
    };

    let header = render_header(doc, layout, padding, &photo);
    let body = match layout {
        Layout::Sidebar => {
            let side = join_sections(&[skills(doc), languages(doc), certifications(doc)]);
            let main = join_sections(&[summary(doc), experience(doc, layout), education(doc), projects(doc), custom(doc)]);
            format!(
                "<div class=\"grid-sidebar {padding}\"><aside class=\"{stack}\">{side}</aside><main class=\"{stack}\">{main}</main></div>"
            )
        }
        _ => {
            let sections = join_sections(&[
                summary(doc),
                experience(doc, layout),
                education(doc),
                skills(doc),
                projects(doc),
                certifications(doc),
                languages(doc),
                custom(doc),
            ]);
            format!("<div class=\"{padding} {stack}\">{sections}</div>")
        }
    };

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n<title>{title}</title>\n<style>{PAGE_CSS}</style>\n</head>\n<body>\n<div class=\"preview-container\">\n<div id=\"{card_id}\" class=\"{card_classes}\" style=\"{card_style}\">\n{header}\n{body}\n</div>\n</div>\n</body>\n</html>\n",
        title = escape_html(&title),
    )
}

fn render_header(doc: &ResumeDocument, layout: Layout, padding: &str, photo: &str) -> String {
    let info = &doc.personal_info;
    let contacts: Vec<String> = [&info.email, &info.phone, &info.location, &info.website, &info.linkedin]
        .into_iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(escape_html)
        .collect();

    let mut inner = String::new();
    inner.push_str(&format!("<h1>{}</h1>", escape_html(&info.full_name())));
    if !info.title.trim().is_empty() {
        inner.push_str(&format!("<p class=\"meta\">{}</p>", escape_html(info.title.trim())));
    }
    if !contacts.is_empty() {
        inner.push_str(&format!("<p class=\"meta\">{}</p>", contacts.join(" · ")));
    }

    let band = if layout == Layout::Banner { " header-band" } else { "" };
    let align = if layout == Layout::Minimal { " text-center" } else { "" };
    format!("<header class=\"{padding}{band}{align}\">{photo}<div>{inner}</div></header>")
}

fn join_sections(sections: &[Option<String>]) -> String {
    sections.iter().flatten().cloned().collect::<Vec<_>>().join("\n")
}

fn section(key: &str, heading: &str, content: String) -> String {
    format!(
        "<section data-section=\"{key}\"><h2>{}</h2>{content}</section>",
        escape_html(heading)
    )
}

/// Free text split into paragraphs on blank lines; single newlines become `<br>`.
fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let lines: Vec<String> = p.lines().map(|l| escape_html(l.trim())).collect();
            format!("<p>{}</p>", lines.join("<br>"))
        })
        .collect()
}

fn date_range(start: &str, end: &str, current: bool) -> String {
    let end = if current { "Present" } else { end.trim() };
    match (start.trim(), end) {
        ("", "") => String::new(),
        (s, "") => escape_html(s),
        ("", e) => escape_html(e),
        (s, e) => format!("{} – {}", escape_html(s), escape_html(e)),
    }
}

fn summary(doc: &ResumeDocument) -> Option<String> {
    let text = doc.personal_info.summary.trim();
    (!text.is_empty()).then(|| section("summary", "Summary", paragraphs(text)))
}

fn experience(doc: &ResumeDocument, layout: Layout) -> Option<String> {
    if doc.experiences.is_empty() {
        return None;
    }
    let items: String = doc
        .experiences
        .iter()
        .map(|exp| {
            let mut item = format!(
                "<div><h3>{}</h3><p class=\"meta\">{}",
                escape_html(&exp.position),
                escape_html(&exp.company)
            );
            if !exp.location.trim().is_empty() {
                item.push_str(&format!(", {}", escape_html(exp.location.trim())));
            }
            let dates = date_range(&exp.start_date, &exp.end_date, exp.current);
            if !dates.is_empty() {
                item.push_str(&format!(" | {dates}"));
            }
            item.push_str("</p>");
            item.push_str(&paragraphs(&exp.description));
            let achievements: Vec<String> = exp
                .achievements
                .iter()
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .map(|a| format!("<li>{}</li>", escape_html(a)))
                .collect();
            if !achievements.is_empty() {
                item.push_str(&format!("<ul>{}</ul>", achievements.concat()));
            }
            item.push_str("</div>");
            item
        })
        .collect();
    let wrapper = if layout == Layout::Timeline { "timeline space-y-4" } else { "space-y-4" };
    Some(section("experience", "Experience", format!("<div class=\"{wrapper}\">{items}</div>")))
}

fn education(doc: &ResumeDocument) -> Option<String> {
    if doc.education.is_empty() {
        return None;
    }
    let items: String = doc
        .education
        .iter()
        .map(|edu| {
            let degree = match (edu.degree.trim(), edu.field.trim()) {
                (d, "") => escape_html(d),
                ("", f) => escape_html(f),
                (d, f) => format!("{} in {}", escape_html(d), escape_html(f)),
            };
            let mut item = format!(
                "<div><h3>{degree}</h3><p class=\"meta\">{}",
                escape_html(&edu.institution)
            );
            let dates = date_range(&edu.start_date, &edu.end_date, false);
            if !dates.is_empty() {
                item.push_str(&format!(" | {dates}"));
            }
            if !edu.gpa.trim().is_empty() {
                item.push_str(&format!(" | GPA {}", escape_html(edu.gpa.trim())));
            }
            item.push_str("</p>");
            item.push_str(&paragraphs(&edu.description));
            item.push_str("</div>");
            item
        })
        .collect();
    Some(section("education", "Education", format!("<div class=\"space-y-3\">{items}</div>")))
}

fn skills(doc: &ResumeDocument) -> Option<String> {
    if doc.skills.is_empty() {
        return None;
    }
    // Grouped by category in first-seen order.
    let mut groups: Vec<(&str, Vec<String>)> = Vec::new();
    for skill in &doc.skills {
        let category = skill.category.trim();
        let label = if (1..=5).contains(&skill.level) {
            format!("{} ({}/5)", escape_html(&skill.name), skill.level)
        } else {
            escape_html(&skill.name)
        };
        match groups.iter_mut().find(|(c, _)| *c == category) {
            Some((_, names)) => names.push(label),
            None => groups.push((category, vec![label])),
        }
    }
    let items: String = groups
        .into_iter()
        .map(|(category, names)| {
            if category.is_empty() {
                format!("<p>{}</p>", names.join(", "))
            } else {
                format!("<p><strong>{}:</strong> {}</p>", escape_html(category), names.join(", "))
            }
        })
        .collect();
    Some(section("skills", "Skills", items))
}

fn projects(doc: &ResumeDocument) -> Option<String> {
    if doc.projects.is_empty() {
        return None;
    }
    let items: String = doc
        .projects
        .iter()
        .map(|p| {
            let mut item = format!("<div><h3>{}</h3>", escape_html(&p.name));
            let dates = date_range(&p.start_date, &p.end_date, false);
            if !dates.is_empty() || !p.url.trim().is_empty() {
                let mut meta = dates;
                if !p.url.trim().is_empty() {
                    if !meta.is_empty() {
                        meta.push_str(" | ");
                    }
                    meta.push_str(&format!(
                        "<a href=\"{0}\">{0}</a>",
                        escape_html(p.url.trim())
                    ));
                }
                item.push_str(&format!("<p class=\"meta\">{meta}</p>"));
            }
            item.push_str(&paragraphs(&p.description));
            if !p.technologies.is_empty() {
                let tech: Vec<String> = p.technologies.iter().map(|t| escape_html(t.trim())).collect();
                item.push_str(&format!("<p class=\"meta\">{}</p>", tech.join(", ")));
            }
            item.push_str("</div>");
            item
        })
        .collect();
    Some(section("projects", "Projects", format!("<div class=\"space-y-3\">{items}</div>")))
}

fn certifications(doc: &ResumeDocument) -> Option<String> {
    if doc.certifications.is_empty() {
        return None;
    }
    let items: String = doc
        .certifications
        .iter()
        .map(|c| {
            let mut line = escape_html(&c.name);
            if !c.issuer.trim().is_empty() {
                line.push_str(&format!(", {}", escape_html(c.issuer.trim())));
            }
            if !c.date.trim().is_empty() {
                line.push_str(&format!(" ({})", escape_html(c.date.trim())));
            }
            format!("<li>{line}</li>")
        })
        .collect();
    Some(section("certifications", "Certifications", format!("<ul>{items}</ul>")))
}

fn languages(doc: &ResumeDocument) -> Option<String> {
    if doc.languages.is_empty() {
        return None;
    }
    let items: String = doc
        .languages
        .iter()
        .map(|l| match l.proficiency.trim() {
            "" => format!("<li>{}</li>", escape_html(&l.name)),
            p => format!("<li>{} – {}</li>", escape_html(&l.name), escape_html(p)),
        })
        .collect();
    Some(section("languages", "Languages", format!("<ul>{items}</ul>")))
}

fn custom(doc: &ResumeDocument) -> Option<String> {
    let sections: Vec<String> = doc
        .custom_sections
        .iter()
        .filter(|s| !s.title.trim().is_empty() || !s.content.trim().is_empty())
        .map(|s| section("custom", s.title.trim(), paragraphs(&s.content)))
        .collect();
    (!sections.is_empty()).then(|| sections.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::sanitizer::extract_target;
    use crate::models::resume::{
        Certification, CustomSection, Education, Experience, Language, PersonalInfo, Project, Skill,
    };

    fn sample() -> StoredResume {
        let mut stored = StoredResume::default();
        stored.resume_data = ResumeDocument {
            personal_info: PersonalInfo {
                first_name: "王小明".to_string(),
                title: "Senior Engineer".to_string(),
                email: "xiaoming@example.com".to_string(),
                summary: "Builds compilers.\n\nLikes <tags> & ampersands.".to_string(),
                ..Default::default()
            },
            experiences: vec![Experience {
                company: "字节跳动".to_string(),
                position: "Staff Engineer".to_string(),
                start_date: "2020-01".to_string(),
                current: true,
                achievements: vec!["Shipped the export pipeline".to_string()],
                ..Default::default()
            }],
            education: vec![Education {
                institution: "Tsinghua University".to_string(),
                degree: "BSc".to_string(),
                field: "Computer Science".to_string(),
                ..Default::default()
            }],
            skills: vec![
                Skill {
                    name: "Rust".to_string(),
                    level: 5,
                    category: "Languages".to_string(),
                    ..Default::default()
                },
                Skill {
                    name: "Go".to_string(),
                    category: "Languages".to_string(),
                    ..Default::default()
                },
            ],
            projects: vec![Project {
                name: "vitae".to_string(),
                technologies: vec!["Rust".to_string(), "Chromium".to_string()],
                ..Default::default()
            }],
            certifications: vec![Certification {
                name: "CKA".to_string(),
                issuer: "CNCF".to_string(),
                ..Default::default()
            }],
            languages: vec![Language {
                name: "Mandarin".to_string(),
                proficiency: "Native".to_string(),
                ..Default::default()
            }],
            custom_sections: vec![CustomSection {
                title: "Volunteering".to_string(),
                content: "Code club mentor".to_string(),
                ..Default::default()
            }],
        };
        stored
    }

    #[test]
    fn test_page_contains_every_section_text() {
        let page = render_page(&sample());
        for text in [
            "王小明",
            "Senior Engineer",
            "xiaoming@example.com",
            "Builds compilers.",
            "字节跳动",
            "2020-01 – Present",
            "Shipped the export pipeline",
            "BSc in Computer Science",
            "<strong>Languages:</strong> Rust (5/5), Go",
            "Rust, Chromium",
            "CKA, CNCF",
            "Mandarin – Native",
            "Volunteering",
            "Code club mentor",
        ] {
            assert!(page.contains(text), "missing {text}");
        }
    }

    #[test]
    fn test_user_text_is_escaped() {
        let page = render_page(&sample());
        assert!(page.contains("Likes &lt;tags&gt; &amp; ampersands."));
        assert!(!page.contains("<tags>"));
    }

    #[test]
    fn test_target_is_extractable() {
        let page = render_page(&sample());
        let target = extract_target(&page, DEFAULT_TARGET_SELECTOR).unwrap();
        assert!(target.starts_with("<div"));
        assert!(target.contains("id=\"resume-preview\""));
        assert!(target.contains("王小明"));
    }

    #[test]
    fn test_every_template_renders_deterministically() {
        for template in [
            TemplateId::TemplateA,
            TemplateId::TemplateB,
            TemplateId::TemplateC,
            TemplateId::TemplateD,
            TemplateId::TemplateE,
            TemplateId::TemplateF,
        ] {
            let mut stored = sample();
            stored.settings.template = template;
            let first = render_page(&stored);
            assert_eq!(first, render_page(&stored));
            assert!(first.contains(template.as_str()));
            assert!(first.contains("Shipped the export pipeline"));
        }
    }

    #[test]
    fn test_settings_drive_classes() {
        let mut stored = sample();
        stored.settings.font_size = FontSizeTier::Large;
        stored.settings.spacing = SpacingTier::Relaxed;
        stored.settings.color_scheme = ColorScheme::Teal;
        let page = render_page(&stored);
        assert!(page.contains("text-lg"));
        assert!(page.contains("space-y-6"));
        assert!(page.contains("--resume-accent: #0d9488"));

        stored.settings.template = TemplateId::TemplateB;
        assert!(render_page(&stored).contains("grid-sidebar"));
    }

    #[test]
    fn test_photo_only_when_enabled() {
        let mut stored = sample();
        stored.settings.photo_url = Some("https://cdn.example.com/me.png".to_string());
        assert!(!render_page(&stored).contains("<img"));
        stored.settings.show_photo = true;
        assert!(render_page(&stored).contains("src=\"https://cdn.example.com/me.png\""));
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let page = render_page(&StoredResume::default());
        assert!(!page.contains("data-section"));
        assert!(page.contains("<title>Resume</title>"));
    }
}
