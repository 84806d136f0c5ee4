use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Résumé content
// ────────────────────────────────────────────────────────────────────────────

/// The full structured content of one résumé.
///
/// Field names follow the editor's camelCase JSON. Every collection defaults to
/// empty so blobs written before a section existed still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeDocument {
    pub personal_info: PersonalInfo,
    pub experiences: Vec<Experience>,
    pub education: Vec<Education>,
    pub skills: Vec<Skill>,
    pub projects: Vec<Project>,
    pub certifications: Vec<Certification>,
    pub languages: Vec<Language>,
    pub custom_sections: Vec<CustomSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub title: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub website: String,
    pub linkedin: String,
    pub summary: String,
}

impl PersonalInfo {
    pub fn full_name(&self) -> String {
        let first = self.first_name.trim();
        let last = self.last_name.trim();
        match (first.is_empty(), last.is_empty()) {
            (false, false) => format!("{first} {last}"),
            (false, true) => first.to_string(),
            (true, false) => last.to_string(),
            (true, true) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Experience {
    pub id: String,
    pub company: String,
    pub position: String,
    pub location: String,
    pub start_date: String,
    pub end_date: String,
    pub current: bool,
    pub description: String,
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Education {
    pub id: String,
    pub institution: String,
    pub degree: String,
    pub field: String,
    pub start_date: String,
    pub end_date: String,
    pub gpa: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Skill {
    pub id: String,
    pub name: String,
    /// 1–5; 0 means "not rated".
    pub level: u8,
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub technologies: Vec<String>,
    pub url: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Certification {
    pub id: String,
    pub name: String,
    pub issuer: String,
    pub date: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Language {
    pub id: String,
    pub name: String,
    pub proficiency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomSection {
    pub id: String,
    pub title: String,
    pub content: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Visual settings
// ────────────────────────────────────────────────────────────────────────────

/// The six résumé templates the editor offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateId {
    #[default]
    TemplateA,
    TemplateB,
    TemplateC,
    TemplateD,
    TemplateE,
    TemplateF,
}

impl TemplateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateId::TemplateA => "template-a",
            TemplateId::TemplateB => "template-b",
            TemplateId::TemplateC => "template-c",
            TemplateId::TemplateD => "template-d",
            TemplateId::TemplateE => "template-e",
            TemplateId::TemplateF => "template-f",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSizeTier {
    Small,
    #[default]
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpacingTier {
    Compact,
    #[default]
    Normal,
    Relaxed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Blue,
    Green,
    Purple,
    Red,
    Gray,
    Teal,
}

impl ColorScheme {
    /// Accent color as a hex string.
    pub fn accent_hex(&self) -> &'static str {
        match self {
            ColorScheme::Blue => "#2563eb",
            ColorScheme::Green => "#16a34a",
            ColorScheme::Purple => "#7c3aed",
            ColorScheme::Red => "#dc2626",
            ColorScheme::Gray => "#4b5563",
            ColorScheme::Teal => "#0d9488",
        }
    }
}

/// Visual configuration applied on top of a [`ResumeDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderSettings {
    pub template: TemplateId,
    pub font_size: FontSizeTier,
    pub spacing: SpacingTier,
    pub color_scheme: ColorScheme,
    pub font_family: String,
    pub show_photo: bool,
    pub photo_url: Option<String>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            template: TemplateId::default(),
            font_size: FontSizeTier::default(),
            spacing: SpacingTier::default(),
            color_scheme: ColorScheme::default(),
            font_family: "Inter".to_string(),
            show_photo: false,
            photo_url: None,
        }
    }
}

/// The only persisted state: one document plus its settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredResume {
    pub resume_data: ResumeDocument,
    pub settings: RenderSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_parse_editor_json() {
        let json = r#"{"template":"template-c","fontSize":"large","spacing":"compact","colorScheme":"teal","fontFamily":"Lato","showPhoto":true,"photoUrl":"https://cdn.example.com/me.png"}"#;
        let settings: RenderSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.template, TemplateId::TemplateC);
        assert_eq!(settings.font_size, FontSizeTier::Large);
        assert_eq!(settings.spacing, SpacingTier::Compact);
        assert_eq!(settings.color_scheme, ColorScheme::Teal);
        assert!(settings.show_photo);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let json = r#"{"personalInfo":{"firstName":"Ada"}}"#;
        let doc: ResumeDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.personal_info.first_name, "Ada");
        assert!(doc.experiences.is_empty());
        assert!(doc.custom_sections.is_empty());
    }

    #[test]
    fn test_full_name_handles_missing_parts() {
        let mut info = PersonalInfo {
            first_name: "王小明".to_string(),
            ..Default::default()
        };
        assert_eq!(info.full_name(), "王小明");
        info.last_name = "Wang".to_string();
        assert_eq!(info.full_name(), "王小明 Wang");
    }
}
