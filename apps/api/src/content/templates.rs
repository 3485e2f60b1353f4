//! Resume visual templates: built-ins, AI-generated variations, and the random
//! fallback used whenever the AI call cannot produce usable variations.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_VARIATIONS: usize = 6;
pub const DEFAULT_VARIATIONS: usize = 3;
/// Generated templates kept in the catalog; the oldest are dropped first.
const CATALOG_CAPACITY: usize = 50;

pub const FONTS: &[&str] = &[
    "Inter",
    "Roboto",
    "Lato",
    "Open Sans",
    "Source Sans Pro",
    "Merriweather",
    "Georgia",
    "Playfair Display",
];

/// (name, primary, accent)
pub const COLOR_PALETTES: &[(&str, &str, &str)] = &[
    ("Classic Navy", "#1f3a5f", "#4a90d9"),
    ("Charcoal", "#2d2d2d", "#7a7a7a"),
    ("Forest", "#1e4d2b", "#5fa36a"),
    ("Burgundy", "#6d1a36", "#c45b7c"),
    ("Slate Teal", "#264653", "#2a9d8f"),
    ("Midnight Purple", "#3a2e5c", "#8e7cc3"),
    ("Warm Sand", "#5c4033", "#d4a373"),
];

pub const KNOWN_SECTIONS: &[&str] = &[
    "summary",
    "experience",
    "education",
    "skills",
    "projects",
    "certifications",
];

pub const SECTION_ORDERS: &[&[&str]] = &[
    &["summary", "experience", "education", "skills"],
    &["summary", "skills", "experience", "education"],
    &["experience", "skills", "education", "summary"],
    &["summary", "experience", "projects", "skills", "education"],
    &["education", "experience", "skills", "summary"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    #[default]
    SingleColumn,
    TwoColumn,
    Sidebar,
}

impl Layout {
    const ALL: [Layout; 3] = [Layout::SingleColumn, Layout::TwoColumn, Layout::Sidebar];

    fn label(&self) -> &'static str {
        match self {
            Layout::SingleColumn => "Single Column",
            Layout::TwoColumn => "Two Column",
            Layout::Sidebar => "Sidebar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeTemplate {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub font_family: String,
    pub primary_color: String,
    pub accent_color: String,
    pub section_order: Vec<String>,
    #[serde(default)]
    pub layout: Layout,
}

fn template(
    id: &str,
    name: &str,
    font: &str,
    (_, primary, accent): (&str, &str, &str),
    order: &[&str],
    layout: Layout,
) -> ResumeTemplate {
    ResumeTemplate {
        id: id.to_string(),
        name: name.to_string(),
        font_family: font.to_string(),
        primary_color: primary.to_string(),
        accent_color: accent.to_string(),
        section_order: order.iter().map(|s| s.to_string()).collect(),
        layout,
    }
}

pub fn builtin_templates() -> Vec<ResumeTemplate> {
    vec![
        template(
            "classic",
            "Classic",
            "Georgia",
            COLOR_PALETTES[0],
            SECTION_ORDERS[0],
            Layout::SingleColumn,
        ),
        template(
            "modern",
            "Modern",
            "Inter",
            COLOR_PALETTES[4],
            SECTION_ORDERS[1],
            Layout::TwoColumn,
        ),
        template(
            "minimal",
            "Minimal",
            "Lato",
            COLOR_PALETTES[1],
            SECTION_ORDERS[2],
            Layout::Sidebar,
        ),
    ]
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Keeps only well-formed variations and assigns fresh ids.
/// Unknown and repeated section names are dropped (first occurrence wins); a
/// template left with no sections is discarded.
pub fn sanitize_generated(templates: Vec<ResumeTemplate>) -> Vec<ResumeTemplate> {
    templates
        .into_iter()
        .filter_map(|mut t| {
            let mut seen = HashSet::new();
            t.section_order
                .retain(|s| KNOWN_SECTIONS.contains(&s.as_str()) && seen.insert(s.clone()));
            let valid = !t.name.trim().is_empty()
                && !t.font_family.trim().is_empty()
                && is_hex_color(&t.primary_color)
                && is_hex_color(&t.accent_color)
                && !t.section_order.is_empty();
            valid.then(|| {
                t.id = format!("ai-{}", Uuid::new_v4());
                t
            })
        })
        .collect()
}

/// Random variations drawn from the static option lists.
/// When a base template is given, its font is avoided where possible.
pub fn random_variations<R: Rng + ?Sized>(
    base: Option<&ResumeTemplate>,
    count: usize,
    rng: &mut R,
) -> Vec<ResumeTemplate> {
    let fonts: Vec<&str> = match base {
        Some(b) => FONTS
            .iter()
            .copied()
            .filter(|f| *f != b.font_family)
            .collect(),
        None => FONTS.to_vec(),
    };

    (0..count)
        .map(|_| {
            let font = fonts.choose(rng).copied().unwrap_or(FONTS[0]);
            let palette = COLOR_PALETTES.choose(rng).copied().unwrap_or(COLOR_PALETTES[0]);
            let order = SECTION_ORDERS.choose(rng).copied().unwrap_or(SECTION_ORDERS[0]);
            let layout = Layout::ALL.choose(rng).copied().unwrap_or_default();
            let name = format!("{} {}", palette.0, layout.label());
            let id = format!("fallback-{}", Uuid::new_v4());
            template(&id, &name, font, palette, order, layout)
        })
        .collect()
}

/// Built-in templates plus recently generated ones, shared across requests.
#[derive(Clone, Default)]
pub struct TemplateCatalog {
    generated: Arc<RwLock<VecDeque<ResumeTemplate>>>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, templates: &[ResumeTemplate]) {
        let mut generated = self.generated.write().unwrap_or_else(|e| e.into_inner());
        for t in templates {
            if generated.len() == CATALOG_CAPACITY {
                generated.pop_front();
            }
            generated.push_back(t.clone());
        }
    }

    pub fn all(&self) -> Vec<ResumeTemplate> {
        let generated = self.generated.read().unwrap_or_else(|e| e.into_inner());
        builtin_templates()
            .into_iter()
            .chain(generated.iter().cloned())
            .collect()
    }
}
