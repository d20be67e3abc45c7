//! Portfolio pipeline: drives one job through its stages.
//!
//! Flow: validate → create job → extract text (upload request)
//!       build prompt → generate → assemble → store (generate request)
//!
//! Every stage fails fast. A failing stage marks the job `failed` with a readable
//! reason before the error is returned, so a job never stays pending after a
//! request returns.

use bytes::Bytes;
use chrono::Utc;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::extraction::{extract_text, secure_filename, validate_upload};
use crate::jobs::{Job, JobId, JobStatus, JobStore};
use crate::portfolio::assemble::assemble_document;
use crate::portfolio::prompts::{build_request, ensure_content, PORTFOLIO_PROMPT_TEMPLATE};
use crate::state::AppState;

/// A file pulled out of the multipart upload.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Validates the upload, creates the job and extracts its text.
///
/// Invalid uploads are rejected before a job exists. Once the job exists, extraction
/// failures (including a PDF with no text) leave it `failed`.
pub async fn ingest_upload(state: &AppState, upload: UploadedFile) -> Result<Job, AppError> {
    validate_upload(
        &upload.filename,
        upload.content_type.as_deref(),
        &upload.bytes,
        state.config.max_upload_bytes,
    )?;

    let filename = secure_filename(&upload.filename);
    let job = state.jobs.create(&filename, &upload.bytes).await?;
    let id = job.id;

    let extracted = async {
        state.jobs.transition(id, JobStatus::Extracting).await?;
        let text = extract_text(&job.source_path).await?;
        let text = ensure_content(&text)?.to_string();
        info!("Job {id}: extracted {} characters", text.len());
        state.jobs.record_text(id, text).await
    }
    .await;

    fail_job_on_error(&state.jobs, id, extracted).await
}

/// Runs prompt building and generation for an extracted job and stores the result.
///
/// `ready` and `failed` jobs are returned unchanged, so repeating the call is harmless.
pub async fn generate_portfolio(state: &AppState, id: JobId) -> Result<Job, AppError> {
    let job = state.jobs.get(id).await?;
    if job.status.is_terminal() {
        return Ok(job);
    }

    match job.status {
        JobStatus::Generating => {
            return Err(AppError::Conflict(format!(
                "Generation for job {id} is already in progress"
            )))
        }
        JobStatus::Received => {
            return Err(AppError::NotReady {
                job_id: id.to_string(),
                status: job.status.to_string(),
            })
        }
        JobStatus::Extracting if job.resume_text.is_none() => {
            return Err(AppError::NotReady {
                job_id: id.to_string(),
                status: job.status.to_string(),
            })
        }
        JobStatus::Extracting | JobStatus::Ready | JobStatus::Failed => {}
    }

    // A concurrent request that got here first turns this into a Conflict.
    let job = state.jobs.transition(id, JobStatus::Generating).await?;

    let generated = async {
        let text = job.resume_text.as_deref().unwrap_or_default();
        let request = build_request(
            text,
            &state.prompt_template,
            state.generator.primary_model(),
        )?;

        let template_kind = if request.template() == PORTFOLIO_PROMPT_TEMPLATE {
            "built-in"
        } else {
            "custom"
        };
        info!(
            "Job {id}: prompting {} with {} characters of resume text ({template_kind} template, {}-character prompt)",
            request.target_model(),
            request.resume_text().len(),
            request.prompt().len()
        );
        let result = state
            .generator
            .generate(&request)
            .await
            .map_err(|e| AppError::GenerationFailed(e.to_string()))?;
        info!(
            "Job {id}: {} ({}) answered as {:?}",
            result.provider, result.model, result.role
        );

        let document = assemble_document(&result.text, Utc::now());
        state.jobs.complete(id, &document, &result.provider).await
    }
    .await;

    fail_job_on_error(&state.jobs, id, generated).await
}

async fn fail_job_on_error<T>(
    jobs: &JobStore,
    id: JobId,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    if let Err(e) = &result {
        if let Err(mark_err) = jobs.fail(id, &e.public_message()).await {
            warn!("Could not mark job {id} failed: {mark_err}");
        }
    }
    result
}
