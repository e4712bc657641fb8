//! Job service: creation entry point and the read-only query surface

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::{JobStatus, JobStoreDb, JobStoreStats, ProcessingJob};
use crate::types::DocumentRecord;

use super::scheduler::Scheduler;

/// Reduced job view for polling clients
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: f64,
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// True iff the job reached a terminal status (completed or failed)
    pub completed: bool,
}

/// Service for managing background document processing jobs
#[derive(Clone)]
pub struct JobService {
    db: Arc<JobStoreDb>,
    scheduler: Arc<Scheduler>,
}

impl JobService {
    pub fn new(db: Arc<JobStoreDb>, scheduler: Arc<Scheduler>) -> Self {
        Self { db, scheduler }
    }

    /// Create a new processing job for a document and schedule it
    pub async fn create_job(&self, document: &DocumentRecord) -> Result<Uuid> {
        let job = ProcessingJob::new(document);
        self.db.insert_job(&job)?;
        self.scheduler.submit(job.id).await?;

        tracing::info!(
            "Created processing job {} for document {}",
            job.id,
            document.id
        );
        Ok(job.id)
    }

    /// Get the full snapshot of a job
    pub fn job_status(&self, job_id: Uuid) -> Result<Option<ProcessingJob>> {
        self.db.get_job(job_id)
    }

    /// List jobs with the given status, newest first
    pub fn jobs_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<ProcessingJob>> {
        self.db.jobs_by_status(status, limit)
    }

    /// List the most recent jobs, newest first
    pub fn recent_jobs(&self, limit: usize) -> Result<Vec<ProcessingJob>> {
        self.db.recent_jobs(limit)
    }

    /// Reduced progress view for polling; `None` for unknown jobs
    pub fn job_progress(&self, job_id: Uuid) -> Result<Option<JobProgress>> {
        let job = match self.db.get_job(job_id)? {
            Some(job) => job,
            None => return Ok(None),
        };

        Ok(Some(JobProgress {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            current_step: job.current_step,
            error_message: job.error_message,
            completed: job.status.is_terminal(),
        }))
    }

    /// Aggregate job counts per status
    pub fn stats(&self) -> Result<JobStoreStats> {
        self.db.job_stats()
    }
}
