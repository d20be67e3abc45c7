//! Document Assembler: turns the model's sectioned answer into one self-contained
//! HTML file.
//!
//! Expected input is three marked sections (`===HTML===`, `===CSS===`, `===JS===`).
//! Models do not always comply, so two fallbacks apply in order:
//!   1. the answer already is a full document → served from its doctype/`<html>` on;
//!   2. anything else → treated as body markup and wrapped.

use chrono::{DateTime, Utc};

use crate::portfolio::prompts::{CSS_MARKER, HTML_MARKER, JS_MARKER};

const DEFAULT_TITLE: &str = "Portfolio";

const BASE_CSS: &str = r#"* { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: 'Poppins', -apple-system, BlinkMacSystemFont, sans-serif;
            line-height: 1.6;
            color: #333;
            background-color: #f8fafc;
        }
        .container { max-width: 1200px; margin: 0 auto; padding: 0 20px; }
        section { padding: 80px 0; }
        @media (max-width: 768px) {
            .container { padding: 0 15px; }
            section { padding: 60px 0; }
        }"#;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PortfolioSections {
    pub html: String,
    pub css: String,
    pub js: String,
}

/// Splits a marked answer into its parts. `None` when the HTML marker is missing.
pub fn split_sections(ai_text: &str) -> Option<PortfolioSections> {
    let (_, rest) = ai_text.split_once(HTML_MARKER)?;

    let (html, rest) = rest.split_once(CSS_MARKER).unwrap_or((rest, ""));
    let (css, js) = rest.split_once(JS_MARKER).unwrap_or((rest, ""));

    Some(PortfolioSections {
        html: strip_code_fences(html),
        css: strip_code_fences(css),
        js: strip_code_fences(js),
    })
}

/// Drops Markdown fence lines (```html, ```css, ```) and trims the result.
pub fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Produces the final downloadable document.
pub fn assemble_document(ai_text: &str, generated_at: DateTime<Utc>) -> String {
    if let Some(sections) = split_sections(ai_text) {
        if !sections.html.is_empty() {
            return wrap_document(&sections, generated_at);
        }
    }

    if let Some(start) = full_document_start(ai_text) {
        return strip_code_fences(&ai_text[start..]);
    }

    let sections = PortfolioSections {
        html: strip_code_fences(ai_text),
        ..Default::default()
    };
    wrap_document(&sections, generated_at)
}

fn full_document_start(text: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    lower.find("<!doctype").or_else(|| lower.find("<html"))
}

fn wrap_document(sections: &PortfolioSections, generated_at: DateTime<Utc>) -> String {
    let title = extract_title(&sections.html).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let css = if sections.css.is_empty() {
        "/* No CSS generated */"
    } else {
        sections.css.as_str()
    };
    let js = if sections.js.is_empty() {
        "// No JavaScript generated"
    } else {
        sections.js.as_str()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css" rel="stylesheet">
    <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css">
    <link href="https://fonts.googleapis.com/css2?family=Poppins:wght@300;400;500;600;700&display=swap" rel="stylesheet">
    <style>
        {base_css}

        {css}
    </style>
</head>
<body>
{html}

    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js"></script>
    <script>
{js}
    </script>
    <footer style="background: #1f2937; color: white; padding: 20px; text-align: center; margin-top: 50px;">
        <p style="margin: 0; font-size: 0.9em; opacity: 0.8;">Generated {generated}</p>
    </footer>
</body>
</html>
"#,
        title = title,
        base_css = BASE_CSS,
        css = css,
        html = sections.html,
        js = js,
        generated = generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Viewer page that frames a ready portfolio next to its download action.
///
/// `filename` must already be sanitised; it is inserted as-is.
pub fn render_viewer(preview_url: &str, download_url: &str, filename: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Portfolio Preview</title>
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css" rel="stylesheet">
    <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css">
    <style>
        body {{ margin: 0; background: #f5f5f5; }}
        .viewer-header {{
            background: linear-gradient(135deg, #6366f1 0%, #8b5cf6 100%);
            color: white;
            padding: 25px;
            text-align: center;
        }}
        .viewer-panel {{
            background: white;
            margin: 20px auto;
            max-width: 1400px;
            border-radius: 10px;
            box-shadow: 0 2px 10px rgba(0,0,0,0.1);
            overflow: hidden;
        }}
        .viewer-actions {{ text-align: center; padding: 25px; }}
    </style>
</head>
<body>
    <div class="viewer-header">
        <h1><i class="fas fa-rocket me-2"></i>Portfolio Preview</h1>
        <p class="lead">Generated from: {filename}</p>
    </div>
    <div class="viewer-panel viewer-actions">
        <a href="{download_url}" class="btn btn-primary btn-lg mx-2"><i class="fas fa-download me-2"></i>Download Portfolio</a>
        <a href="{preview_url}" target="_blank" class="btn btn-success btn-lg mx-2"><i class="fas fa-external-link-alt me-2"></i>Open in New Tab</a>
    </div>
    <div class="viewer-panel">
        <iframe src="{preview_url}" title="Portfolio Preview" style="width: 100%; height: 800px; border: none;"></iframe>
    </div>
</body>
</html>
"#
    )
}

/// Text of the first `<h1>`, with inner tags removed.
fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<h1")?;
    let content_start = open + lower[open..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find("</h1>")?;

    let mut text = String::new();
    let mut in_tag = false;
    for c in html[content_start..content_end].chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}
