//! In-memory job registry plus the per-job files on disk.
//!
//! The registry map is the only state shared between jobs. It is injected through
//! `AppState` and never held across a provider call. Files are keyed by job id:
//!   {upload_dir}/{id}_{filename}
//!   {output_dir}/{id}_portfolio.html

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::jobs::{Job, JobId, JobStatus};

#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    upload_dir: PathBuf,
    output_dir: PathBuf,
    max_active_jobs: usize,
}

fn not_found(id: JobId) -> AppError {
    AppError::NotFound(format!("Job {id} not found"))
}

impl JobStore {
    pub fn new(upload_dir: PathBuf, output_dir: PathBuf, max_active_jobs: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            upload_dir,
            output_dir,
            max_active_jobs,
        }
    }

    /// Creates both directories and clears files left behind by a previous process.
    /// Returns how many stale files were removed.
    pub async fn init(&self) -> anyhow::Result<usize> {
        for dir in [&self.upload_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        self.purge_orphans()
            .await
            .context("Failed to purge stale job files")
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Registers a new job in `received` and writes its source file.
    pub async fn create(&self, filename: &str, bytes: &[u8]) -> Result<Job, AppError> {
        let id = JobId::new();
        let now = Utc::now();
        let job = Job {
            id,
            status: JobStatus::Received,
            filename: filename.to_string(),
            source_path: self.upload_dir.join(format!("{id}_{filename}")),
            output_path: None,
            source_bytes: bytes.len() as u64,
            output_bytes: None,
            created_at: now,
            updated_at: now,
            error: None,
            resume_text: None,
            provider: None,
        };

        {
            let mut jobs = self.jobs.write().await;
            if jobs.len() >= self.max_active_jobs {
                return Err(AppError::Busy(format!(
                    "{} jobs are already in progress, try again later",
                    jobs.len()
                )));
            }
            jobs.insert(id, job.clone());
        }

        if let Err(e) = tokio::fs::write(&job.source_path, bytes).await {
            self.jobs.write().await.remove(&id);
            return Err(e.into());
        }

        info!("Job {id} received ({} bytes, {filename})", bytes.len());
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Job, AppError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Moves a job along the state machine. Illegal moves are rejected with `Conflict`.
    pub async fn transition(&self, id: JobId, next: JobStatus) -> Result<Job, AppError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;

        if !job.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Job {id} cannot move from {} to {next}",
                job.status
            )));
        }

        debug!("Job {id}: {} -> {next}", job.status);
        job.status = next;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    /// Stores extracted text on a job that is still `extracting`.
    pub async fn record_text(&self, id: JobId, text: String) -> Result<Job, AppError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;

        if job.status != JobStatus::Extracting {
            return Err(AppError::Conflict(format!(
                "Job {id} is {}, not extracting",
                job.status
            )));
        }

        job.resume_text = Some(text);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    /// Marks a job failed with a human-readable reason. Failing an already failed job
    /// keeps the first reason.
    pub async fn fail(&self, id: JobId, reason: &str) -> Result<Job, AppError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;

        if job.status == JobStatus::Failed {
            return Ok(job.clone());
        }
        if !job.status.can_transition_to(JobStatus::Failed) {
            return Err(AppError::Conflict(format!(
                "Job {id} is {} and cannot fail",
                job.status
            )));
        }

        warn!("Job {id} failed during {}: {reason}", job.status);
        job.status = JobStatus::Failed;
        job.error = Some(reason.to_string());
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    /// Persists the generated document and marks the job `ready`.
    ///
    /// The document is written to a temp path first and renamed into place under the
    /// registry lock, so the output file never exists for a job that is not `ready`.
    pub async fn complete(&self, id: JobId, html: &str, provider: &str) -> Result<Job, AppError> {
        let final_path = self.output_path(id);
        let temp_path = self.temp_output_path(id);
        tokio::fs::write(&temp_path, html).await?;

        let outcome = {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(&id) {
                None => Err(not_found(id)),
                Some(job) if !job.status.can_transition_to(JobStatus::Ready) => Err(
                    AppError::Conflict(format!("Job {id} is {}, not generating", job.status)),
                ),
                Some(job) => match tokio::fs::rename(&temp_path, &final_path).await {
                    Ok(()) => {
                        job.status = JobStatus::Ready;
                        job.output_path = Some(final_path);
                        job.output_bytes = Some(html.len() as u64);
                        job.provider = Some(provider.to_string());
                        job.updated_at = Utc::now();
                        Ok(job.clone())
                    }
                    Err(e) => Err(AppError::Io(e)),
                },
            }
        };

        match &outcome {
            Ok(_) => info!("Job {id} ready ({} bytes via {provider})", html.len()),
            Err(_) => remove_quietly(&temp_path).await,
        }
        outcome
    }

    /// Returns the job and the exact bytes last written for it.
    pub async fn read_output(&self, id: JobId) -> Result<(Job, Vec<u8>), AppError> {
        let job = self.get(id).await?;

        if job.status != JobStatus::Ready {
            return Err(AppError::NotReady {
                job_id: id.to_string(),
                status: job.status.to_string(),
            });
        }

        let path = job
            .output_path
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow!("ready job {id} has no output path")))?;

        match tokio::fs::read(path).await {
            Ok(bytes) => Ok((job, bytes)),
            // Swept between the lookup and the read.
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Evicts a job and deletes its files. Returns false if the job was unknown.
    pub async fn remove(&self, id: JobId) -> bool {
        let removed = self.jobs.write().await.remove(&id);
        match removed {
            Some(job) => {
                self.delete_files(&job).await;
                info!("Job {id} cleaned up");
                true
            }
            None => false,
        }
    }

    /// Evicts every job whose last update is older than `cutoff`.
    pub async fn sweep(&self, cutoff: DateTime<Utc>) -> usize {
        let expired: Vec<Job> = {
            let mut jobs = self.jobs.write().await;
            let ids: Vec<JobId> = jobs
                .values()
                .filter(|j| j.updated_at < cutoff)
                .map(|j| j.id)
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };

        for job in &expired {
            self.delete_files(job).await;
            debug!("Job {} expired ({})", job.id, job.status);
        }

        if !expired.is_empty() {
            info!("Swept {} expired job(s)", expired.len());
        }
        expired.len()
    }

    /// Deletes files in either directory that no registered job references.
    pub async fn purge_orphans(&self) -> std::io::Result<usize> {
        let referenced: HashSet<PathBuf> = {
            let jobs = self.jobs.read().await;
            jobs.values()
                .flat_map(|j| {
                    let temp = (j.status == JobStatus::Generating)
                        .then(|| self.temp_output_path(j.id));
                    std::iter::once(j.source_path.clone())
                        .chain(j.output_path.clone())
                        .chain(temp)
                })
                .collect()
        };

        let mut removed = 0;
        for dir in [&self.upload_dir, &self.output_dir] {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if !entry.file_type().await?.is_file() || referenced.contains(&path) {
                    continue;
                }
                remove_quietly(&path).await;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Removed {removed} orphaned file(s)");
        }
        Ok(removed)
    }

    fn output_path(&self, id: JobId) -> PathBuf {
        self.output_dir.join(format!("{id}_portfolio.html"))
    }

    fn temp_output_path(&self, id: JobId) -> PathBuf {
        self.output_dir.join(format!("{id}_portfolio.html.tmp"))
    }

    async fn delete_files(&self, job: &Job) {
        remove_quietly(&job.source_path).await;
        if let Some(output) = &job.output_path {
            remove_quietly(output).await;
        }
        remove_quietly(&self.temp_output_path(job.id)).await;
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {e}", path.display()),
    }
}

#[cfg(test)]
impl JobStore {
    /// Pushes a job's last update into the past.
    pub async fn backdate(&self, id: JobId, by: chrono::Duration) {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            job.updated_at = job.updated_at - by;
        }
    }
}
