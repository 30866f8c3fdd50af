//! The structured knowledge base the assistant answers from.
//!
//! The on-disk format is a JSON object with one key per category. Only
//! `basic` is required (and within it `name` and `title`); every other
//! category may be absent or empty.
//!
//! ```json
//! {
//!   "basic": { "name": "Alex", "title": "Engineer" },
//!   "skills": [{ "category": "Languages", "items": ["Rust", "Go"] }, "Kubernetes"],
//!   "experience": [{ "role": "Engineer", "organization": "Acme", "highlights": ["..."] }],
//!   "faqs": [{ "q": "Open to relocation?", "a": "Yes, within the EU." }]
//! }
//! ```
//!
//! Each category is a typed section that knows how to render itself to
//! plain text ([`RenderText`]); [`KnowledgeRecord::section`] is the single
//! exhaustive mapping from [`Category`] to section.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The closed set of knowledge categories, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Basic,
    Skills,
    Experience,
    Projects,
    Education,
    Certifications,
    Interests,
    Goals,
    Faqs,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Basic,
        Category::Skills,
        Category::Experience,
        Category::Projects,
        Category::Education,
        Category::Certifications,
        Category::Interests,
        Category::Goals,
        Category::Faqs,
    ];

    /// The `doc_type` tag stored alongside every chunk.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Basic => "basic",
            Category::Skills => "skills",
            Category::Experience => "experience",
            Category::Projects => "projects",
            Category::Education => "education",
            Category::Certifications => "certifications",
            Category::Interests => "interests",
            Category::Goals => "goals",
            Category::Faqs => "faqs",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::Index(format!("unknown doc_type '{}'", s)))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KnowledgeRecord {
    pub basic: BasicInfo,
    #[serde(default)]
    pub skills: Vec<SkillGroup>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub certifications: Vec<Certification>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub faqs: Vec<Faq>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BasicInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

/// A skill list entry: either a bare skill or a named group of skills.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SkillGroup {
    Single(String),
    Group {
        #[serde(default)]
        category: Option<String>,
        items: Vec<String>,
    },
}

impl SkillGroup {
    /// Non-blank skills, trimmed.
    fn items(&self) -> Vec<&str> {
        let raw: Vec<&str> = match self {
            SkillGroup::Single(s) => vec![s.as_str()],
            SkillGroup::Group { items, .. } => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExperienceEntry {
    pub role: String,
    pub organization: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Education {
    pub institution: String,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Certification {
    pub name: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Faq {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub a: String,
}

/// Identity the assistant speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub title: String,
}

/// A borrowed view of one non-empty category.
#[derive(Debug, Clone, Copy)]
pub enum Section<'a> {
    Basic(&'a BasicInfo),
    Skills(&'a [SkillGroup]),
    Experience(&'a [ExperienceEntry]),
    Projects(&'a [Project]),
    Education(&'a [Education]),
    Certifications(&'a [Certification]),
    Interests(&'a [String]),
    Goals(&'a [String]),
    Faqs(&'a [Faq]),
}

/// Render a knowledge item as plain text for embedding.
pub trait RenderText {
    fn render(&self) -> String;
}

impl KnowledgeRecord {
    /// Parse a record from JSON text and check the identity fields.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let record: KnowledgeRecord = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid knowledge file: {}", e)))?;
        record.validate()?;
        Ok(record)
    }

    /// `basic.name` and `basic.title` must be present and non-blank.
    pub fn validate(&self) -> Result<()> {
        if self.basic.name.trim().is_empty() {
            return Err(Error::Configuration(
                "knowledge.basic.name must not be empty".to_string(),
            ));
        }
        if self.basic.title.trim().is_empty() {
            return Err(Error::Configuration(
                "knowledge.basic.title must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn persona(&self) -> Persona {
        Persona {
            name: self.basic.name.trim().to_string(),
            title: self.basic.title.trim().to_string(),
        }
    }

    /// The section for `category`, or `None` when it has nothing to say.
    pub fn section(&self, category: Category) -> Option<Section<'_>> {
        let section = match category {
            Category::Basic => Section::Basic(&self.basic),
            Category::Skills => Section::Skills(&self.skills),
            Category::Experience => Section::Experience(&self.experience),
            Category::Projects => Section::Projects(&self.projects),
            Category::Education => Section::Education(&self.education),
            Category::Certifications => Section::Certifications(&self.certifications),
            Category::Interests => Section::Interests(&self.interests),
            Category::Goals => Section::Goals(&self.goals),
            Category::Faqs => Section::Faqs(&self.faqs),
        };
        if section.is_empty() {
            None
        } else {
            Some(section)
        }
    }

    /// A short overview of the whole record.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("Knowledge base for: {}", self.basic.name.trim()),
            format!("Title: {}", self.basic.title.trim()),
        ];
        if let Some(summary) = non_blank(&self.basic.summary) {
            parts.push(format!("Summary: {}", summary));
        }

        for category in Category::ALL.into_iter().skip(1) {
            let count = match category {
                Category::Skills => self.skills.iter().map(|g| g.items().len()).sum(),
                Category::Experience => self.experience.len(),
                Category::Projects => self.projects.len(),
                Category::Education => self.education.len(),
                Category::Certifications => self.certifications.len(),
                Category::Interests => self.interests.len(),
                Category::Goals => self.goals.len(),
                Category::Faqs => self.faqs.len(),
                Category::Basic => continue,
            };
            if count > 0 {
                parts.push(format!("{} entries: {}", category, count));
            }
        }

        let skills: Vec<&str> = self.skills.iter().flat_map(|g| g.items()).collect();
        if !skills.is_empty() {
            let mut list = skills.iter().take(12).copied().collect::<Vec<_>>().join(", ");
            if skills.len() > 12 {
                list.push_str(", ...");
            }
            parts.push(format!("Top skills: {}", list));
        }

        parts.join("\n")
    }
}

/// Load and validate a knowledge record from a JSON file.
pub fn load_knowledge(path: &Path) -> Result<KnowledgeRecord> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!(
            "failed to read knowledge file {}: {}",
            path.display(),
            e
        ))
    })?;
    KnowledgeRecord::from_json_str(&content)
}

impl Section<'_> {
    pub fn category(&self) -> Category {
        match self {
            Section::Basic(_) => Category::Basic,
            Section::Skills(_) => Category::Skills,
            Section::Experience(_) => Category::Experience,
            Section::Projects(_) => Category::Projects,
            Section::Education(_) => Category::Education,
            Section::Certifications(_) => Category::Certifications,
            Section::Interests(_) => Category::Interests,
            Section::Goals(_) => Category::Goals,
            Section::Faqs(_) => Category::Faqs,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Section::Basic(b) => b.name.trim().is_empty() && b.title.trim().is_empty(),
            Section::Skills(s) => s.iter().all(|g| g.items().is_empty()),
            Section::Experience(s) => s.is_empty(),
            Section::Projects(s) => s.is_empty(),
            Section::Education(s) => s.is_empty(),
            Section::Certifications(s) => s.is_empty(),
            Section::Interests(s) => s.iter().all(|i| i.trim().is_empty()),
            Section::Goals(s) => s.iter().all(|g| g.trim().is_empty()),
            Section::Faqs(s) => s.iter().all(|f| f.q.trim().is_empty() && f.a.trim().is_empty()),
        }
    }
}

impl RenderText for Section<'_> {
    fn render(&self) -> String {
        match self {
            Section::Basic(basic) => basic.render(),
            Section::Skills(groups) => {
                let lines: Vec<String> = groups
                    .iter()
                    .map(RenderText::render)
                    .filter(|l| !l.is_empty())
                    .collect();
                format!("Skills:\n{}", lines.join("\n"))
            }
            Section::Experience(entries) => numbered("Experience:", entries),
            Section::Projects(entries) => numbered("Projects:", entries),
            Section::Education(entries) => numbered("Education:", entries),
            Section::Certifications(certs) => {
                let lines: Vec<String> = certs.iter().map(RenderText::render).collect();
                format!("Certifications:\n{}", lines.join("\n"))
            }
            Section::Interests(items) => bulleted("Interests:", items),
            Section::Goals(items) => bulleted("Goals:", items),
            Section::Faqs(faqs) => {
                let blocks: Vec<String> = faqs
                    .iter()
                    .filter(|f| !(f.q.trim().is_empty() && f.a.trim().is_empty()))
                    .map(RenderText::render)
                    .collect();
                format!("Frequently asked questions:\n\n{}", blocks.join("\n\n"))
            }
        }
    }
}

impl RenderText for BasicInfo {
    fn render(&self) -> String {
        let mut lines = vec![
            format!("Name: {}", self.name.trim()),
            format!("Title: {}", self.title.trim()),
        ];
        if let Some(location) = non_blank(&self.location) {
            lines.push(format!("Location: {}", location));
        }
        if let Some(email) = non_blank(&self.email) {
            lines.push(format!("Email: {}", email));
        }
        if let Some(summary) = non_blank(&self.summary) {
            lines.push(format!("Summary: {}", summary));
        }
        if !self.links.is_empty() {
            lines.push("Links:".to_string());
            lines.extend(self.links.iter().map(|l| format!("- {}", l.trim())));
        }
        lines.join("\n")
    }
}

impl RenderText for SkillGroup {
    fn render(&self) -> String {
        let items = self.items();
        if items.is_empty() {
            return String::new();
        }
        match self {
            SkillGroup::Group { category, .. } => match non_blank(category) {
                Some(cat) => format!("- {}: {}", cat, items.join(", ")),
                None => format!("- {}", items.join(", ")),
            },
            SkillGroup::Single(_) => format!("- {}", items.join(", ")),
        }
    }
}

impl RenderText for ExperienceEntry {
    fn render(&self) -> String {
        let mut head = format!("{} at {}", self.role.trim(), self.organization.trim());
        if let Some(p) = period(&self.start, &self.end) {
            head.push_str(&format!(" ({})", p));
        }
        if let Some(location) = non_blank(&self.location) {
            head.push_str(&format!(", {}", location));
        }
        let mut lines = vec![head];
        if let Some(desc) = non_blank(&self.description) {
            lines.push(desc.to_string());
        }
        lines.extend(self.highlights.iter().map(|h| format!("- {}", h.trim())));
        lines.join("\n")
    }
}

impl RenderText for Project {
    fn render(&self) -> String {
        let mut lines = vec![self.name.trim().to_string()];
        if let Some(desc) = non_blank(&self.description) {
            lines.push(desc.to_string());
        }
        if !self.technologies.is_empty() {
            lines.push(format!("Technologies: {}", self.technologies.join(", ")));
        }
        if let Some(url) = non_blank(&self.url) {
            lines.push(format!("URL: {}", url));
        }
        lines.extend(self.highlights.iter().map(|h| format!("- {}", h.trim())));
        lines.join("\n")
    }
}

impl RenderText for Education {
    fn render(&self) -> String {
        let mut head = match (non_blank(&self.degree), non_blank(&self.field)) {
            (Some(d), Some(f)) => format!("{} in {}, {}", d, f, self.institution.trim()),
            (Some(d), None) => format!("{}, {}", d, self.institution.trim()),
            (None, Some(f)) => format!("{}, {}", f, self.institution.trim()),
            (None, None) => self.institution.trim().to_string(),
        };
        if let Some(p) = period(&self.start, &self.end) {
            head.push_str(&format!(" ({})", p));
        }
        let mut lines = vec![head];
        lines.extend(self.details.iter().map(|d| format!("- {}", d.trim())));
        lines.join("\n")
    }
}

impl RenderText for Certification {
    fn render(&self) -> String {
        let mut line = format!("- {}", self.name.trim());
        if let Some(issuer) = non_blank(&self.issuer) {
            line.push_str(&format!(", {}", issuer));
        }
        if let Some(date) = non_blank(&self.date) {
            line.push_str(&format!(" ({})", date));
        }
        if let Some(url) = non_blank(&self.url) {
            line.push_str(&format!(" {}", url));
        }
        line
    }
}

impl RenderText for Faq {
    fn render(&self) -> String {
        format!("Q: {}\nA: {}", self.q.trim(), self.a.trim())
    }
}

fn numbered<T: RenderText>(heading: &str, items: &[T]) -> String {
    let blocks: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.render()))
        .collect();
    format!("{}\n\n{}", heading, blocks.join("\n\n"))
}

fn bulleted(heading: &str, items: &[String]) -> String {
    let lines: Vec<String> = items
        .iter()
        .map(|i| i.trim())
        .filter(|i| !i.is_empty())
        .map(|i| format!("- {}", i))
        .collect();
    format!("{}\n{}", heading, lines.join("\n"))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn period(start: &Option<String>, end: &Option<String>) -> Option<String> {
    match (non_blank(start), non_blank(end)) {
        (Some(s), Some(e)) => Some(format!("{} - {}", s, e)),
        (Some(s), None) => Some(format!("{} - present", s)),
        (None, Some(e)) => Some(e.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "basic": { "name": "Alex", "title": "Engineer", "location": "Berlin" },
        "skills": [{ "category": "Languages", "items": ["Rust", "Go"] }, "Kubernetes"],
        "experience": [
            { "role": "Staff Engineer", "organization": "Acme", "start": "2020",
              "highlights": ["Led the storage team"] }
        ],
        "interests": ["climbing", "  "],
        "faqs": [{ "q": "Remote?", "a": "Yes." }, { "q": "", "a": "" }]
    }"#;

    #[test]
    fn test_parse_and_validate() {
        let record = KnowledgeRecord::from_json_str(SAMPLE).unwrap();
        assert_eq!(record.persona().name, "Alex");
        assert_eq!(record.skills.len(), 2);
        assert!(record.projects.is_empty());
    }

    #[test]
    fn test_missing_basic_is_configuration_error() {
        let err = KnowledgeRecord::from_json_str(r#"{ "skills": ["Rust"] }"#).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_blank_title_is_configuration_error() {
        let err =
            KnowledgeRecord::from_json_str(r#"{ "basic": { "name": "Alex", "title": " " } }"#)
                .unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("title")));
    }

    #[test]
    fn test_empty_sections_are_skipped() {
        let record = KnowledgeRecord::from_json_str(SAMPLE).unwrap();
        assert!(record.section(Category::Projects).is_none());
        assert!(record.section(Category::Goals).is_none());
        assert!(record.section(Category::Interests).is_some());
    }

    #[test]
    fn test_render_lists_every_item() {
        let record = KnowledgeRecord::from_json_str(SAMPLE).unwrap();
        let skills = record.section(Category::Skills).unwrap().render();
        assert!(skills.contains("- Languages: Rust, Go"));
        assert!(skills.contains("- Kubernetes"));

        let exp = record.section(Category::Experience).unwrap().render();
        assert!(exp.contains("1. Staff Engineer at Acme (2020 - present)"));
        assert!(exp.contains("- Led the storage team"));

        let faqs = record.section(Category::Faqs).unwrap().render();
        assert!(faqs.contains("Q: Remote?\nA: Yes."));
        assert!(!faqs.contains("Q: \n"));
    }

    #[test]
    fn test_blank_skills_are_ignored() {
        let record = KnowledgeRecord::from_json_str(
            r#"{ "basic": { "name": "Alex", "title": "Engineer" },
                 "skills": ["", "  ", { "category": "Tools", "items": [" "] }] }"#,
        )
        .unwrap();
        assert!(record.section(Category::Skills).is_none());

        let record = KnowledgeRecord::from_json_str(
            r#"{ "basic": { "name": "Alex", "title": "Engineer" },
                 "skills": ["", " Rust ", { "items": ["Go", " "] }] }"#,
        )
        .unwrap();
        let skills = record.section(Category::Skills).unwrap().render();
        assert_eq!(skills, "Skills:\n- Rust\n- Go");
    }

    #[test]
    fn test_summary_mentions_counts() {
        let record = KnowledgeRecord::from_json_str(SAMPLE).unwrap();
        let summary = record.summary();
        assert!(summary.starts_with("Knowledge base for: Alex"));
        assert!(summary.contains("experience entries: 1"));
        assert!(summary.contains("Top skills: Rust, Go, Kubernetes"));
    }

    #[test]
    fn test_category_round_trips_through_str() {
        for c in Category::ALL {
            assert_eq!(c.as_str().parse::<Category>().unwrap(), c);
        }
        assert!("nope".parse::<Category>().is_err());
    }
}
