//! PDF in (text extraction) and PDF out (plain text-flow export of a resume).
//!
//! Export is a straight top-to-bottom text flow in the standard Helvetica faces.
//! There is no layout engine: lines are wrapped by character count.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::errors::AppError;
use crate::models::resume::ResumeDocument;

const PAGE_WIDTH: i64 = 612; // US letter, points
const PAGE_HEIGHT: i64 = 792;
const MARGIN: i64 = 54;
/// Helvetica 11pt averages ~5.5pt per glyph across a 504pt text column.
const WRAP_COLUMNS: usize = 90;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Style {
    Title,
    Heading,
    Body,
}

impl Style {
    fn font(&self) -> &'static str {
        match self {
            Style::Title | Style::Heading => "F2",
            Style::Body => "F1",
        }
    }

    fn size(&self) -> i64 {
        match self {
            Style::Title => 20,
            Style::Heading => 13,
            Style::Body => 11,
        }
    }

    fn leading(&self) -> i64 {
        match self {
            Style::Title => 28,
            Style::Heading => 20,
            Style::Body => 14,
        }
    }
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Extracts plain text. Runs on the blocking pool: extraction is CPU-bound and the
/// extractor panics on some malformed files, which surfaces here as a 400.
pub async fn extract_text(bytes: Vec<u8>) -> Result<String, AppError> {
    if !is_pdf(&bytes) {
        return Err(AppError::Validation("Uploaded file is not a PDF".to_string()));
    }

    match tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await {
        Ok(Ok(text)) => Ok(text.trim().to_string()),
        Ok(Err(e)) => Err(AppError::Validation(format!("Could not read PDF: {e}"))),
        Err(e) if e.is_panic() => Err(AppError::Validation(
            "Could not read PDF: the file appears to be malformed".to_string(),
        )),
        Err(e) => Err(AppError::Internal(e.into())),
    }
}

/// Helvetica's built-in encoding covers ASCII; map common typography and drop the rest.
fn to_pdf_text(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{2018}' | '\u{2019}' => Some('\''),
            '\u{201C}' | '\u{201D}' => Some('"'),
            '\u{2013}' | '\u{2014}' | '\u{2022}' => Some('-'),
            '\t' => Some(' '),
            c if c.is_ascii() && !c.is_ascii_control() => Some(c),
            c if c.is_control() => None,
            _ => Some('?'),
        })
        .collect()
}

/// Greedy word wrap by character count; words longer than a line are split.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            while word.chars().count() > columns {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let split = word
                    .char_indices()
                    .nth(columns)
                    .map(|(i, _)| i)
                    .unwrap_or(word.len());
                lines.push(word[..split].to_string());
                word = word[split..].to_string();
            }
            if line.is_empty() {
                line = word;
            } else if line.chars().count() + 1 + word.chars().count() <= columns {
                line.push(' ');
                line.push_str(&word);
            } else {
                lines.push(std::mem::replace(&mut line, word));
            }
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

fn body(out: &mut Vec<(Style, String)>, text: &str) {
    out.extend(
        wrap(&to_pdf_text(text), WRAP_COLUMNS)
            .into_iter()
            .map(|line| (Style::Body, line)),
    );
}

fn flow(doc: &ResumeDocument) -> Vec<(Style, String)> {
    let mut out = Vec::new();

    let name = doc.personal_info.full_name.trim();
    out.push((Style::Title, to_pdf_text(if name.is_empty() { "Resume" } else { name })));
    let contact = doc.personal_info.contact_line();
    if !contact.is_empty() {
        body(&mut out, &contact);
    }

    if let Some(summary) = doc.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        out.push((Style::Heading, "Summary".to_string()));
        body(&mut out, summary);
    }

    if !doc.experience.is_empty() {
        out.push((Style::Heading, "Experience".to_string()));
        for item in &doc.experience {
            let mut header = format!("{} - {}", item.title, item.company);
            if let Some(range) = item.date_range() {
                header.push_str(&format!(" ({range})"));
            }
            body(&mut out, &header);
            if let Some(description) = &item.description {
                body(&mut out, description);
            }
        }
    }

    if !doc.education.is_empty() {
        out.push((Style::Heading, "Education".to_string()));
        for item in &doc.education {
            let mut line = format!("{}, {}", item.degree, item.institution);
            if let Some(date) = &item.graduation_date {
                line.push_str(&format!(" ({date})"));
            }
            body(&mut out, &line);
        }
    }

    if !doc.skills.is_empty() {
        out.push((Style::Heading, "Skills".to_string()));
        body(&mut out, &doc.skills.join(", "));
    }

    out
}

/// Splits the flow into pages, returning `(style, text, baseline_y)` per page.
fn paginate(lines: Vec<(Style, String)>) -> Vec<Vec<(Style, String, i64)>> {
    let mut pages = vec![Vec::new()];
    let mut y = PAGE_HEIGHT - MARGIN;
    for (style, text) in lines {
        y -= style.leading();
        if y < MARGIN {
            pages.push(Vec::new());
            y = PAGE_HEIGHT - MARGIN - style.leading();
        }
        if let Some(page) = pages.last_mut() {
            page.push((style, text, y));
        }
    }
    pages
}

fn page_content(lines: &[(Style, String, i64)]) -> Content {
    let mut operations = Vec::with_capacity(lines.len() * 5);
    for (style, text, y) in lines {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![style.font().into(), style.size().into()],
        ));
        operations.push(Operation::new("Td", vec![MARGIN.into(), (*y).into()]));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(text.as_str())],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }
}

pub fn render_resume_pdf(resume: &ResumeDocument) -> Result<Vec<u8>, AppError> {
    let pdf_error = |e: lopdf::Error| AppError::Internal(anyhow::anyhow!("PDF encoding failed: {e}"));

    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in paginate(flow(resume)) {
        let content = page_content(&page).encode().map_err(pdf_error)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("PDF write failed: {e}")))?;
    Ok(bytes)
}

/// `Jane Q. Doe` -> `jane-q-doe-resume.pdf`
pub fn download_filename(resume: &ResumeDocument) -> String {
    let slug = resume
        .personal_info
        .full_name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "resume.pdf".to_string()
    } else {
        format!("{slug}-resume.pdf")
    }
}
