//! Text Extractor: validates uploaded resumes and pulls plain text out of them.
//!
//! Parsing is delegated to `pdf-extract`. The parser is synchronous and can panic on
//! malformed input, so it always runs on the blocking pool; a panic there surfaces as
//! an extraction error instead of taking the worker down.

use std::path::Path;

use tracing::{debug, warn};

use crate::errors::AppError;

/// Every PDF starts with this header.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

const ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/x-pdf",
    // Browsers and curl fall back to this when they cannot sniff the type.
    "application/octet-stream",
];

const FALLBACK_FILENAME: &str = "resume.pdf";

/// Stored names are `{job id}_{filename}`; this keeps them well under NAME_MAX.
const MAX_STEM_CHARS: usize = 100;
const MAX_EXTENSION_CHARS: usize = 10;

/// Rejects anything that is not a PDF within the size limit.
/// Called before a job exists, so a rejected upload never creates one.
pub fn validate_upload(
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<(), AppError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if extension.as_deref() != Some("pdf") {
        return Err(AppError::InvalidFile(
            "Only PDF files are allowed".to_string(),
        ));
    }

    if let Some(content_type) = content_type {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
            return Err(AppError::InvalidFile(format!(
                "Unsupported content type '{essence}', expected application/pdf"
            )));
        }
    }

    if bytes.len() > max_bytes {
        return Err(AppError::FileTooLarge {
            limit_bytes: max_bytes,
        });
    }

    if bytes.is_empty() {
        return Err(AppError::InvalidFile("Uploaded file is empty".to_string()));
    }

    if !bytes.starts_with(PDF_SIGNATURE) {
        return Err(AppError::InvalidFile(
            "File does not look like a PDF document".to_string(),
        ));
    }

    Ok(())
}

/// Reduces a client-supplied filename to a safe single path component.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');

    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_alphanumeric()) {
        return FALLBACK_FILENAME.to_string();
    }

    // Only ASCII survives the mapping above, so byte offsets are char offsets.
    match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!(
            "{}.{}",
            &stem[..stem.len().min(MAX_STEM_CHARS)],
            &ext[..ext.len().min(MAX_EXTENSION_CHARS)]
        ),
        _ => cleaned[..cleaned.len().min(MAX_STEM_CHARS)].to_string(),
    }
}

/// Reads the PDF at `path` and returns its text, pages in document order.
pub async fn extract_text(path: &Path) -> Result<String, AppError> {
    let bytes = tokio::fs::read(path).await?;

    let text = tokio::task::spawn_blocking(move || extract_text_from_bytes(&bytes))
        .await
        .map_err(|e| {
            warn!("PDF parser task failed: {e}");
            AppError::Extraction("the PDF parser could not process this file".to_string())
        })??;

    debug!("Extracted {} characters from {}", text.len(), path.display());
    Ok(text)
}

/// Synchronous extraction; callers on the async runtime go through [`extract_text`].
pub fn extract_text_from_bytes(bytes: &[u8]) -> Result<String, AppError> {
    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| AppError::Extraction(format!("unreadable or encrypted PDF ({e})")))?;
    Ok(normalize_whitespace(&raw))
}

/// Trims line ends and collapses runs of blank lines left by page breaks.
fn normalize_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;

    for line in raw.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}

/// Builds a small valid single-page PDF with one text line per entry.
#[cfg(test)]
pub(crate) fn sample_pdf(lines: &[&str]) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 18 Tf\n72 720 Td\n");
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            content.push_str("0 -28 Td\n");
        }
        content.push_str(&format!("({line}) Tj\n"));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    pdf.push_str("0000000000 65535 f \n");
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));

    pdf.into_bytes()
}
