//! Progress reporting against the job store
//!
//! Progress writes are best-effort relative to the job's actual work: a
//! dropped update is logged and must never abort the job.

use std::sync::Arc;
use uuid::Uuid;

use crate::storage::{JobResult, JobStatus, JobStoreDb};

/// Performs atomic status/progress writes for running jobs
#[derive(Clone)]
pub struct ProgressReporter {
    db: Arc<JobStoreDb>,
}

impl ProgressReporter {
    pub fn new(db: Arc<JobStoreDb>) -> Self {
        Self { db }
    }

    /// Write a progress checkpoint for an active job
    ///
    /// Moves the job to `processing`; the first such call stamps `started_at`.
    /// Safe to retry: repeating a call leaves the stored snapshot unchanged.
    pub fn report_progress(&self, job_id: Uuid, progress: f64, step: &str) {
        match self
            .db
            .update_progress(job_id, progress, step, JobStatus::Processing)
        {
            Ok(()) => tracing::debug!("Updated job {}: {}% - {}", job_id, progress, step),
            Err(e) => tracing::error!("Failed to update progress for job {}: {}", job_id, e),
        }
    }

    /// Move a job to its terminal state
    ///
    /// Writes exactly one of result/error_message along with the terminal
    /// status, progress, step label, and `completed_at`.
    pub fn finish(
        &self,
        job_id: Uuid,
        success: bool,
        result: Option<JobResult>,
        error_message: Option<String>,
    ) {
        match self
            .db
            .finish_job(job_id, success, result.as_ref(), error_message.as_deref())
        {
            Ok(()) => tracing::info!(
                "Job {} {}",
                job_id,
                if success { "completed" } else { "failed" }
            ),
            Err(e) => tracing::error!("Failed to finish job {}: {}", job_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ProcessingJob;
    use crate::types::DocumentRecord;

    fn setup() -> (Arc<JobStoreDb>, ProgressReporter, ProcessingJob) {
        let db = Arc::new(JobStoreDb::in_memory().unwrap());
        let doc = DocumentRecord::new(
            "invoice.pdf".to_string(),
            "uploads/documents/invoice.pdf".to_string(),
            512,
        );
        let job = ProcessingJob::new(&doc);
        db.insert_job(&job).unwrap();
        (db.clone(), ProgressReporter::new(db), job)
    }

    #[test]
    fn report_progress_moves_job_to_processing() {
        let (db, reporter, job) = setup();

        reporter.report_progress(job.id, 10.0, "Validating file");

        let stored = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert_eq!(stored.progress, 10.0);
        assert_eq!(stored.current_step.as_deref(), Some("Validating file"));
        assert!(stored.started_at.is_some());
    }

    #[test]
    fn repeated_report_leaves_snapshot_identical() {
        let (db, reporter, job) = setup();

        reporter.report_progress(job.id, 25.0, "Preparing document");
        let first = db.get_job(job.id).unwrap().unwrap();

        reporter.report_progress(job.id, 25.0, "Preparing document");
        let second = db.get_job(job.id).unwrap().unwrap();

        assert_eq!(first.progress, second.progress);
        assert_eq!(first.current_step, second.current_step);
        assert_eq!(first.started_at, second.started_at);
        assert_eq!(first.status, second.status);
    }

    #[test]
    fn finish_success_sets_terminal_snapshot() {
        let (db, reporter, job) = setup();

        let result = JobResult {
            document_id: job.document_id,
            filename: job.filename.clone(),
            financial_data_extracted: true,
            indexed: true,
        };
        reporter.finish(job.id, true, Some(result.clone()), None);

        let stored = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.progress, 100.0);
        assert_eq!(stored.result, Some(result));
        assert!(stored.error_message.is_none());
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn finish_failure_sets_error_and_zero_progress() {
        let (db, reporter, job) = setup();

        reporter.report_progress(job.id, 75.0, "Indexing document in vector store");
        reporter.finish(job.id, false, None, Some("Document indexing failed: x".to_string()));

        let stored = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.progress, 0.0);
        assert_eq!(stored.current_step.as_deref(), Some("Failed"));
        assert!(stored.result.is_none());
        assert!(stored.error_message.is_some());
    }

    #[test]
    fn reporting_on_missing_job_does_not_panic() {
        let (_db, reporter, _job) = setup();
        // Unknown job: the write is a no-op and only logged
        reporter.report_progress(Uuid::new_v4(), 10.0, "Validating file");
        reporter.finish(Uuid::new_v4(), false, None, Some("x".to_string()));
    }
}
