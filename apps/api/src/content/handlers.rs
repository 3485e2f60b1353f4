//! Axum route handlers for the AI-backed resume features.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::analytics::track;
use crate::auth::extractors::OptionalAuthUser;
use crate::content::pdf;
use crate::content::prompts::{self, truncate_chars, CoverLetterInput, MAX_PROMPT_INPUT_CHARS};
use crate::content::suggestions::{split_suggestions, MAX_SUGGESTIONS};
use crate::content::templates::{
    random_variations, sanitize_generated, ResumeTemplate, DEFAULT_VARIATIONS, MAX_VARIATIONS,
};
use crate::errors::AppError;
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, RESUME_WRITER_SYSTEM};
use crate::models::analytics::NewAnalyticsEvent;
use crate::models::resume::ResumeDocument;
use crate::models::user::User;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImproveTextRequest {
    #[validate(length(min = 1, message = "Text is required"))]
    pub text: String,
    pub section_type: Option<String>,
    pub job_title: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImproveTextResponse {
    pub success: bool,
    pub improved_text: String,
}

/// Shape the model is asked to return for a resume analysis.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeAnalysis {
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u8,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
}

/// Accepts any JSON number (or numeric string) and rounds it into `0..=100`.
/// Anything else scores 0.
fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let score = match &raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .unwrap_or(0.0);
    Ok(score.round().clamp(0.0, 100.0) as u8)
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResumeResponse {
    pub success: bool,
    pub analysis: ResumeAnalysis,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsePdfResponse {
    pub success: bool,
    pub text: String,
    pub word_count: usize,
    pub character_count: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTemplatesRequest {
    pub base_template: Option<ResumeTemplate>,
    pub count: Option<i64>,
}

impl GenerateTemplatesRequest {
    /// An empty body means "all defaults"; anything else must be valid JSON.
    fn from_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {e}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateSource {
    Ai,
    Fallback,
}

#[derive(Debug, Serialize)]
pub struct GenerateTemplatesResponse {
    pub success: bool,
    pub source: TemplateSource,
    pub templates: Vec<ResumeTemplate>,
}

#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub success: bool,
    pub templates: Vec<ResumeTemplate>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkSuggestionsRequest {
    #[validate(length(min = 1, max = 200, message = "Job title is required"))]
    pub job_title: String,
    pub company: Option<String>,
    pub industry: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WorkSuggestionsResponse {
    pub success: bool,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CoverLetterRequest {
    #[validate(length(min = 1, max = 200, message = "Job title is required"))]
    pub job_title: String,
    #[validate(length(min = 1, max = 200, message = "Company is required"))]
    pub company: String,
    pub job_description: Option<String>,
    pub applicant_name: Option<String>,
    pub resume_summary: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverLetterResponse {
    pub success: bool,
    pub cover_letter: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn record_use(state: &AppState, user: Option<&User>, feature: &str) {
    track(
        state.analytics.as_ref(),
        NewAnalyticsEvent::new(user.map(|u| u.id), feature, "used"),
    )
    .await;
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Uploaded file as either PDF or UTF-8 text.
async fn upload_to_text(bytes: Vec<u8>) -> Result<String, AppError> {
    if pdf::is_pdf(&bytes) {
        return pdf::extract_text(bytes).await;
    }
    String::from_utf8(bytes)
        .map_err(|_| AppError::Validation("Resume must be a PDF or plain text file".to_string()))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Malformed upload: {e}"))
}

/// Number of templates to produce, clamped to `1..=MAX_VARIATIONS`.
fn variation_count(requested: Option<i64>) -> usize {
    match requested {
        Some(n) => n.clamp(1, MAX_VARIATIONS as i64) as usize,
        None => DEFAULT_VARIATIONS,
    }
}

fn fallback_templates(base: Option<&ResumeTemplate>, count: usize) -> Vec<ResumeTemplate> {
    random_variations(base, count, &mut rand::thread_rng())
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/improve-text
pub async fn handle_improve_text(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Json(req): Json<ImproveTextRequest>,
) -> Result<Json<ImproveTextResponse>, AppError> {
    req.validate()?;
    if req.text.trim().is_empty() {
        return Err(AppError::Validation("Text is required".to_string()));
    }

    let prompt = prompts::improve_text_prompt(
        truncate_chars(req.text.trim(), MAX_PROMPT_INPUT_CHARS),
        non_blank(req.section_type.as_deref()),
        non_blank(req.job_title.as_deref()),
    );
    let improved_text = state.llm.call_text(&prompt, RESUME_WRITER_SYSTEM, 0.7).await?;

    record_use(&state, user.as_ref(), "improve_text").await;

    Ok(Json(ImproveTextResponse {
        success: true,
        improved_text: improved_text.trim().to_string(),
    }))
}

/// POST /api/analyze-resume (multipart: `resume` file, optional `jobDescription`)
pub async fn handle_analyze_resume(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResumeResponse>, AppError> {
    let mut resume_bytes: Option<Vec<u8>> = None;
    let mut job_description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("resume") => {
                resume_bytes = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
            }
            Some("jobDescription") => {
                job_description = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let bytes = resume_bytes
        .filter(|b| !b.is_empty())
        .ok_or_else(|| AppError::Validation("A resume file is required".to_string()))?;
    let resume_text = upload_to_text(bytes).await?;
    if resume_text.trim().is_empty() {
        return Err(AppError::Validation("No text could be read from the resume".to_string()));
    }

    let prompt = prompts::analyze_resume_prompt(
        truncate_chars(&resume_text, MAX_PROMPT_INPUT_CHARS),
        non_blank(job_description.as_deref()).map(|jd| truncate_chars(jd, MAX_PROMPT_INPUT_CHARS)),
    );
    let analysis: ResumeAnalysis = state.llm.call_json(&prompt, JSON_ONLY_SYSTEM, 0.3).await?;

    record_use(&state, user.as_ref(), "analyze_resume").await;

    Ok(Json(AnalyzeResumeResponse {
        success: true,
        analysis,
    }))
}

/// POST /api/parse-pdf (multipart: `pdf` file)
pub async fn handle_parse_pdf(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    mut multipart: Multipart,
) -> Result<Json<ParsePdfResponse>, AppError> {
    let mut upload: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let is_pdf_field = field.name() == Some("pdf");
        if is_pdf_field {
            upload = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
        }
    }

    let bytes = upload.ok_or_else(|| AppError::Validation("A PDF file is required".to_string()))?;
    let text = pdf::extract_text(bytes).await?;

    record_use(&state, user.as_ref(), "parse_pdf").await;

    Ok(Json(ParsePdfResponse {
        success: true,
        word_count: text.split_whitespace().count(),
        character_count: text.chars().count(),
        text,
    }))
}

/// POST /api/generate-pdf
pub async fn handle_generate_pdf(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Json(resume): Json<ResumeDocument>,
) -> Result<Response, AppError> {
    let filename = pdf::download_filename(&resume);
    let bytes = tokio::task::spawn_blocking(move || pdf::render_resume_pdf(&resume))
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

    record_use(&state, user.as_ref(), "generate_pdf").await;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// POST /api/generate-templates
///
/// Falls back to random variations whenever the model is unavailable or its
/// output does not validate.
pub async fn handle_generate_templates(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    body: Bytes,
) -> Result<Json<GenerateTemplatesResponse>, AppError> {
    let req = GenerateTemplatesRequest::from_body(&body)?;
    let count = variation_count(req.count);
    let base = req.base_template.as_ref();

    let generated = if state.llm.is_configured() {
        let prompt = prompts::template_variations_prompt(base, count);
        match state
            .llm
            .call_json::<Vec<ResumeTemplate>>(&prompt, JSON_ONLY_SYSTEM, 0.9)
            .await
        {
            Ok(raw) => {
                let mut valid = sanitize_generated(raw);
                valid.truncate(count);
                if valid.is_empty() {
                    warn!("Model returned no usable templates, using fallback");
                }
                valid
            }
            Err(e) => {
                warn!("Template generation failed, using fallback: {e}");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let (source, templates) = if generated.is_empty() {
        (TemplateSource::Fallback, fallback_templates(base, count))
    } else {
        (TemplateSource::Ai, generated)
    };

    state.templates.add(&templates);
    info!(count = templates.len(), source = ?source, "Generated template variations");

    record_use(&state, user.as_ref(), "generate_templates").await;

    Ok(Json(GenerateTemplatesResponse {
        success: true,
        source,
        templates,
    }))
}

/// GET /api/get-templates
pub async fn handle_get_templates(State(state): State<AppState>) -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        success: true,
        templates: state.templates.all(),
    })
}

/// POST /api/generate-work-suggestions
pub async fn handle_work_suggestions(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Json(req): Json<WorkSuggestionsRequest>,
) -> Result<Json<WorkSuggestionsResponse>, AppError> {
    req.validate()?;

    let prompt = prompts::work_suggestions_prompt(
        req.job_title.trim(),
        non_blank(req.company.as_deref()),
        non_blank(req.industry.as_deref()),
        MAX_SUGGESTIONS,
    );
    let text = state.llm.call_text(&prompt, RESUME_WRITER_SYSTEM, 0.8).await?;
    let suggestions = split_suggestions(&text, MAX_SUGGESTIONS);

    record_use(&state, user.as_ref(), "work_suggestions").await;

    Ok(Json(WorkSuggestionsResponse {
        success: true,
        suggestions,
    }))
}

/// POST /api/generate-cover-letter
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Json(req): Json<CoverLetterRequest>,
) -> Result<Json<CoverLetterResponse>, AppError> {
    req.validate()?;

    let prompt = prompts::cover_letter_prompt(&CoverLetterInput {
        job_title: req.job_title.trim(),
        company: req.company.trim(),
        job_description: non_blank(req.job_description.as_deref())
            .map(|jd| truncate_chars(jd, MAX_PROMPT_INPUT_CHARS)),
        applicant_name: non_blank(req.applicant_name.as_deref()),
        resume_summary: non_blank(req.resume_summary.as_deref())
            .map(|s| truncate_chars(s, MAX_PROMPT_INPUT_CHARS)),
    });
    let cover_letter = state.llm.call_text(&prompt, RESUME_WRITER_SYSTEM, 0.7).await?;

    record_use(&state, user.as_ref(), "cover_letter").await;

    Ok(Json(CoverLetterResponse {
        success: true,
        cover_letter: cover_letter.trim().to_string(),
    }))
}
