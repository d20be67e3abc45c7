//! Prompt Builder: merges extracted resume text into the portfolio template.

use std::path::Path;

use anyhow::{bail, Context};

use crate::errors::AppError;
use crate::llm_client::GenerationRequest;

/// Replaced with the resume text when a prompt is built.
pub const RESUME_PLACEHOLDER: &str = "{resume_text}";

/// Section markers the model is asked to emit. `assemble` splits on them.
pub const HTML_MARKER: &str = "===HTML===";
pub const CSS_MARKER: &str = "===CSS===";
pub const JS_MARKER: &str = "===JS===";

/// Default portfolio prompt. Replace `{resume_text}` before sending.
pub const PORTFOLIO_PROMPT_TEMPLATE: &str = r#"You are a senior front-end engineer and visual designer.
Turn the resume below into a modern, single-page personal portfolio website.

Requirements:
- Use the person's real name as the main heading and keep every fact from the resume.
  Do NOT invent employers, dates, degrees, metrics or contact details.
- Include a hero/about section, then one <section> per resume area that has content
  (experience, projects, skills, education, certifications, contact). Give each section
  an <h2> heading and an id so the navigation bar can link to it.
- Responsive layout that works from 360px phones to wide desktops.
- Bootstrap 5 and Font Awesome 6 are already loaded on the page. You may use their classes.
- Subtle scroll animations and a smooth-scrolling navbar in plain JavaScript. No external
  libraries beyond the two above.

Output format (exactly three sections, in this order, no commentary before or after):
===HTML===
(the markup that goes inside <body>, without <html>, <head> or <body> tags)
===CSS===
(the stylesheet, without <style> tags)
===JS===
(the script, without <script> tags)

RESUME:
{resume_text}
"#;

/// Fails with `EmptyContent` when the text has nothing but whitespace.
pub fn ensure_content(text: &str) -> Result<&str, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::EmptyContent);
    }
    Ok(trimmed)
}

/// Pure: text + template → request. No I/O.
pub fn build_request(
    text: &str,
    template: &str,
    target_model: &str,
) -> Result<GenerationRequest, AppError> {
    let resume_text = ensure_content(text)?;
    let prompt = template.replace(RESUME_PLACEHOLDER, resume_text);

    Ok(GenerationRequest::new(
        resume_text.to_string(),
        template.to_string(),
        prompt,
        target_model.to_string(),
    ))
}

/// Loads the template override at startup, or returns the built-in template.
pub fn load_template(path: Option<&Path>) -> anyhow::Result<String> {
    let Some(path) = path else {
        return Ok(PORTFOLIO_PROMPT_TEMPLATE.to_string());
    };

    let template = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt template {}", path.display()))?;
    if !template.contains(RESUME_PLACEHOLDER) {
        bail!(
            "Prompt template {} does not contain the {RESUME_PLACEHOLDER} placeholder",
            path.display()
        );
    }
    Ok(template)
}
