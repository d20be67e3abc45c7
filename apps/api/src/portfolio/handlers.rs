use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use bytes::BytesMut;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::errors::AppError;
use crate::jobs::sweeper::sweep_expired;
use crate::jobs::{JobId, JobView};
use crate::llm_client::ProviderInfo;
use crate::portfolio::assemble::render_viewer;
use crate::portfolio::pipeline::{generate_portfolio, ingest_upload, UploadedFile};
use crate::state::AppState;

const UPLOAD_FIELD: &str = "file";

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 16 * 1024;

/// Largest request body the upload route accepts.
pub fn upload_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES)
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
    pub active: usize,
}

#[derive(Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}

/// POST /api/v1/jobs
pub async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<JobView>), AppError> {
    let max_bytes = state.config.max_upload_bytes;
    if declared_length(&headers).is_some_and(|len| len > upload_body_limit(max_bytes)) {
        return Err(AppError::FileTooLarge {
            limit_bytes: max_bytes,
        });
    }

    let mut multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;
    let upload = read_upload(&mut multipart, max_bytes).await?;

    let job = ingest_upload(&state, upload).await?;
    info!("Job {} accepted ({} bytes)", job.id, job.source_bytes);
    Ok((StatusCode::CREATED, Json(JobView::from(&job))))
}

/// POST /api/v1/jobs/:id/generate
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, AppError> {
    let id = parse_job_id(&id)?;
    let job = generate_portfolio(&state, id).await?;
    Ok(Json(JobView::from(&job)))
}

/// GET /api/v1/jobs/:id
pub async fn handle_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, AppError> {
    let job = state.jobs.get(parse_job_id(&id)?).await?;
    Ok(Json(JobView::from(&job)))
}

/// GET /api/v1/jobs/:id/download
/// Serves the portfolio as an attachment, then drops the job when configured to.
pub async fn handle_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_job_id(&id)?;
    let (job, bytes) = state.jobs.read_output(id).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download_name(&job.filename, Utc::now())
    );
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("bad Content-Disposition: {e}")))?;

    if state.config.delete_after_download {
        state.jobs.remove(id).await;
    }

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/v1/jobs/:id/preview
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (_, bytes) = state.jobs.read_output(parse_job_id(&id)?).await?;
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )],
        bytes,
    )
        .into_response())
}

/// GET /api/v1/jobs/:id/view
/// Viewer page around the preview. Never cleans up.
pub async fn handle_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let job = state.jobs.get(parse_job_id(&id)?).await?;
    let view = JobView::from(&job);

    match (view.preview_url, view.download_url) {
        (Some(preview_url), Some(download_url)) => Ok(Html(render_viewer(
            &preview_url,
            &download_url,
            &job.filename,
        ))),
        _ => Err(AppError::NotReady {
            job_id: job.id.to_string(),
            status: job.status.to_string(),
        }),
    }
}

/// DELETE /api/v1/jobs/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_job_id(&id)?;
    if !state.jobs.remove(id).await {
        return Err(AppError::NotFound(format!("Job {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/cleanup
pub async fn handle_cleanup(State(state): State<AppState>) -> Json<CleanupResponse> {
    let removed = sweep_expired(&state.jobs, state.config.job_retention).await;
    Json(CleanupResponse {
        removed,
        active: state.jobs.len().await,
    })
}

/// GET /api/v1/providers
pub async fn handle_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.generator.providers(),
    })
}

async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> Result<UploadedFile, AppError> {
    let too_large = |e: MultipartError| upload_error(e, max_bytes);

    while let Some(mut field) = multipart.next_field().await.map_err(too_large)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.trim().is_empty() {
            return Err(AppError::Validation("No file selected".into()));
        }
        let content_type = field.content_type().map(str::to_string);

        // Stop reading as soon as the file passes the limit.
        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(too_large)? {
            if buf.len() + chunk.len() > max_bytes {
                return Err(AppError::FileTooLarge {
                    limit_bytes: max_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }

        return Ok(UploadedFile {
            filename,
            content_type,
            bytes: buf.freeze(),
        });
    }

    Err(AppError::Validation(format!(
        "Missing multipart field '{UPLOAD_FIELD}'"
    )))
}

fn upload_error(e: MultipartError, max_bytes: usize) -> AppError {
    match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::FileTooLarge {
            limit_bytes: max_bytes,
        },
        _ => AppError::Validation(e.body_text()),
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Unparseable ids cannot name a job, so they read as unknown.
fn parse_job_id(raw: &str) -> Result<JobId, AppError> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("Job {raw} not found")))
}

/// `{stem}_portfolio_{YYYYMMDD}.html`
fn download_name(filename: &str, at: chrono::DateTime<Utc>) -> String {
    let stem = std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("resume");
    format!("{stem}_portfolio_{}.html", at.format("%Y%m%d"))
}
