//! Job Manager: per-upload lifecycle, files and cleanup.
//!
//! State machine:
//!   received → extracting → generating → ready
//!   received | extracting | generating → failed
//!
//! A job stays in `extracting` after its text is in hand until generation starts.
//! `ready` and `failed` are terminal; the only way out is eviction by cleanup.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod store;
pub mod sweeper;

pub use store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(JobId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Received,
    Extracting,
    Generating,
    Ready,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Extracting => "extracting",
            JobStatus::Generating => "generating",
            JobStatus::Ready => "ready",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Received, Extracting)
                | (Extracting, Generating)
                | (Generating, Ready)
                | (Received, Failed)
                | (Extracting, Failed)
                | (Generating, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resume-to-portfolio request.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Sanitised client filename.
    pub filename: String,
    pub source_path: PathBuf,
    /// Set only while the job is `ready`.
    pub output_path: Option<PathBuf>,
    pub source_bytes: u64,
    pub output_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Extracted text, held between upload and generation.
    pub resume_text: Option<String>,
    pub provider: Option<String>,
}

/// Client-facing projection of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub filename: String,
    pub file_size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub text_extracted: bool,
    pub provider: Option<String>,
    pub output_size_bytes: Option<u64>,
    pub download_url: Option<String>,
    pub preview_url: Option<String>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        let ready = job.status == JobStatus::Ready;
        JobView {
            job_id: job.id,
            status: job.status,
            filename: job.filename.clone(),
            file_size_bytes: job.source_bytes,
            created_at: job.created_at,
            updated_at: job.updated_at,
            error: job.error.clone(),
            text_extracted: job.resume_text.is_some(),
            provider: job.provider.clone(),
            output_size_bytes: job.output_bytes,
            download_url: ready.then(|| format!("/api/v1/jobs/{}/download", job.id)),
            preview_url: ready.then(|| format!("/api/v1/jobs/{}/preview", job.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    const ALL: [JobStatus; 5] = [Received, Extracting, Generating, Ready, Failed];

    #[test]
    fn test_happy_path_transitions() {
        assert!(Received.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Generating));
        assert!(Generating.can_transition_to(Ready));
    }

    #[test]
    fn test_every_non_terminal_stage_can_fail() {
        for status in [Received, Extracting, Generating] {
            assert!(status.can_transition_to(Failed), "{status} -> failed");
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in [Ready, Failed] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_skipping_stages() {
        assert!(!Received.can_transition_to(Generating));
        assert!(!Received.can_transition_to(Ready));
        assert!(!Extracting.can_transition_to(Ready));
        assert!(!Generating.can_transition_to(Extracting));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Generating).unwrap(), "\"generating\"");
        assert_eq!(Ready.to_string(), "ready");
    }

    #[test]
    fn test_job_id_parses_and_rejects_garbage() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-job".parse::<JobId>().is_err());
        assert_ne!(JobId::new(), JobId::new());
    }
}
