//! Prompt builders for the AI content routes.

use crate::content::templates::{ResumeTemplate, KNOWN_SECTIONS};

/// Caps the amount of user text forwarded to the model.
pub const MAX_PROMPT_INPUT_CHARS: usize = 12_000;

pub fn improve_text_prompt(text: &str, section_type: Option<&str>, job_title: Option<&str>) -> String {
    let section = section_type.unwrap_or("resume");
    let mut prompt = format!(
        "Improve the following {section} text for a resume. Make it concise, use strong action verbs, \
         and keep every fact the user gave. Return only the improved text, with no preamble.\n"
    );
    if let Some(title) = job_title {
        prompt.push_str(&format!("The candidate is targeting the role: {title}.\n"));
    }
    prompt.push_str("\nText:\n");
    prompt.push_str(text);
    prompt
}

pub fn analyze_resume_prompt(resume_text: &str, job_description: Option<&str>) -> String {
    let mut prompt = String::from(
        "Analyze the resume below. Respond with a JSON object with exactly these keys:\n\
         - \"score\": integer 0-100 rating overall quality\n\
         - \"summary\": one or two sentences\n\
         - \"strengths\": array of strings\n\
         - \"improvements\": array of concrete suggestions\n\
         - \"keywords\": array of important keywords present in the resume\n\
         - \"missingKeywords\": array of keywords from the job description that the resume lacks \
           (empty array when no job description is given)\n\n",
    );
    if let Some(jd) = job_description {
        prompt.push_str("Job description:\n");
        prompt.push_str(jd);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Resume:\n");
    prompt.push_str(resume_text);
    prompt
}

pub fn work_suggestions_prompt(
    job_title: &str,
    company: Option<&str>,
    industry: Option<&str>,
    count: usize,
) -> String {
    let mut prompt = format!(
        "Write {count} resume bullet points describing typical accomplishments for a {job_title}"
    );
    if let Some(company) = company {
        prompt.push_str(&format!(" at {company}"));
    }
    if let Some(industry) = industry {
        prompt.push_str(&format!(" in the {industry} industry"));
    }
    prompt.push_str(
        ". Each bullet starts with an action verb and is at most 25 words. \
         Put one bullet per line with no numbering and no extra commentary.",
    );
    prompt
}

pub struct CoverLetterInput<'a> {
    pub job_title: &'a str,
    pub company: &'a str,
    pub job_description: Option<&'a str>,
    pub applicant_name: Option<&'a str>,
    pub resume_summary: Option<&'a str>,
}

pub fn cover_letter_prompt(input: &CoverLetterInput<'_>) -> String {
    let mut prompt = format!(
        "Write a professional cover letter for the position of {} at {}. \
         Keep it under 350 words, in three to four paragraphs, and do not invent qualifications.\n",
        input.job_title, input.company
    );
    if let Some(name) = input.applicant_name {
        prompt.push_str(&format!("Sign the letter as {name}.\n"));
    }
    if let Some(summary) = input.resume_summary {
        prompt.push_str("\nApplicant background:\n");
        prompt.push_str(summary);
        prompt.push('\n');
    }
    if let Some(jd) = input.job_description {
        prompt.push_str("\nJob description:\n");
        prompt.push_str(jd);
        prompt.push('\n');
    }
    prompt
}

pub fn template_variations_prompt(base: Option<&ResumeTemplate>, count: usize) -> String {
    let base_json = base
        .and_then(|b| serde_json::to_string(b).ok())
        .unwrap_or_else(|| "none".to_string());
    format!(
        "Generate {count} visual variations of a resume template. Base template: {base_json}\n\
         Respond with a JSON array. Each element is an object with keys \
         \"name\" (string), \"fontFamily\" (a common web-safe or Google font), \
         \"primaryColor\" and \"accentColor\" (hex colors like \"#1f3a5f\"), \
         \"sectionOrder\" (array using only these values: {sections}), and \
         \"layout\" (one of \"single-column\", \"two-column\", \"sidebar\").",
        sections = KNOWN_SECTIONS.join(", ")
    )
}

/// Truncates to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
