//! Document processing pipeline
//!
//! Runs the stage sequence for one job: validate the file, prepare the
//! document snapshot, extract financial data (best-effort), index into the
//! vector store (required), finalize. Each stage reports a fixed progress
//! checkpoint before its work starts, and a stage never begins until the
//! previous checkpoint write has been acknowledged by the job store.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::providers::{DocumentIndexer, FinancialParser};
use crate::storage::{FinancialMetadataRecord, JobResult, JobStoreDb, ProcessingJob};
use crate::types::DocumentRecord;

use super::reporter::ProgressReporter;
use super::scheduler::JobRunner;

/// Stage pipeline executed once per scheduled job
pub struct DocumentPipeline {
    db: Arc<JobStoreDb>,
    reporter: ProgressReporter,
    /// Optional: jobs still complete without extraction when the parser is
    /// unavailable (e.g. no API key configured)
    parser: Option<Arc<dyn FinancialParser>>,
    indexer: Arc<dyn DocumentIndexer>,
    stage_timeout: Duration,
}

impl DocumentPipeline {
    pub fn new(
        db: Arc<JobStoreDb>,
        parser: Option<Arc<dyn FinancialParser>>,
        indexer: Arc<dyn DocumentIndexer>,
        stage_timeout: Duration,
    ) -> Self {
        let reporter = ProgressReporter::new(Arc::clone(&db));
        Self {
            db,
            reporter,
            parser,
            indexer,
            stage_timeout,
        }
    }

    /// Run all stages for a loaded job
    ///
    /// Expected failures (missing file, indexing error) finish the job inline
    /// and return `Ok`; only unexpected errors propagate to the caller.
    async fn process(&self, job: &ProcessingJob) -> crate::error::Result<()> {
        // Stage 1: validate the file still exists where the snapshot points
        self.reporter.report_progress(job.id, 10.0, "Validating file");

        let file_exists = tokio::fs::try_exists(&job.file_path).await.unwrap_or(false);
        if !file_exists {
            self.reporter.finish(
                job.id,
                false,
                None,
                Some(format!("File not found: {}", job.file_path)),
            );
            return Ok(());
        }

        // Stage 2: rebuild the document snapshot from the job record
        self.reporter.report_progress(job.id, 25.0, "Preparing document");

        let document = DocumentRecord {
            id: job.document_id,
            filename: job.filename.clone(),
            file_path: job.file_path.clone(),
            content_type: mime_guess::from_path(&job.filename)
                .first_or_octet_stream()
                .to_string(),
            file_size: job.file_size,
            uploaded_at: Utc::now(),
            indexed: false,
        };

        // Stage 3: financial extraction. Best-effort: any failure here is
        // logged and the pipeline continues to indexing without extracted data.
        self.reporter
            .report_progress(job.id, 40.0, "Extracting financial data");

        let financial_data_extracted = self.extract_financial_data(job, &document).await;

        // Stage 4: vector store indexing. Failure is fatal for the job.
        self.reporter
            .report_progress(job.id, 75.0, "Indexing document in vector store");

        match timeout(self.stage_timeout, self.indexer.index(&document)).await {
            Ok(Ok(())) => {
                if let Err(e) = self.db.set_indexed_in_chroma(job.id, true) {
                    tracing::error!("Failed to set indexed flag for job {}: {}", job.id, e);
                }
            }
            Ok(Err(e)) => {
                tracing::error!("Document indexing failed for job {}: {}", job.id, e);
                self.reporter.finish(
                    job.id,
                    false,
                    None,
                    Some(format!("Document indexing failed: {}", e)),
                );
                return Ok(());
            }
            Err(_) => {
                tracing::error!(
                    "Document indexing timed out after {}s for job {}",
                    self.stage_timeout.as_secs(),
                    job.id
                );
                self.reporter.finish(
                    job.id,
                    false,
                    None,
                    Some(format!(
                        "Document indexing timed out after {}s",
                        self.stage_timeout.as_secs()
                    )),
                );
                return Ok(());
            }
        }

        // Stage 5: finalize
        self.reporter
            .report_progress(job.id, 100.0, "Processing completed");

        let result = JobResult {
            document_id: job.document_id,
            filename: job.filename.clone(),
            financial_data_extracted,
            indexed: true,
        };
        self.reporter.finish(job.id, true, Some(result), None);

        tracing::info!("Document processing job {} completed successfully", job.id);
        Ok(())
    }

    /// Enrichment stage: parse the document and store extracted metadata
    ///
    /// Returns whether extracted data was stored. Never fails the job;
    /// parser errors and timeouts are logged and swallowed.
    async fn extract_financial_data(&self, job: &ProcessingJob, document: &DocumentRecord) -> bool {
        let Some(parser) = &self.parser else {
            tracing::debug!("Financial parser not available, skipping extraction for job {}", job.id);
            return false;
        };

        let parsed = match timeout(self.stage_timeout, parser.parse(document)).await {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(e)) => {
                tracing::warn!("Financial parsing failed for job {}: {}", job.id, e);
                return false;
            }
            Err(_) => {
                tracing::warn!(
                    "Financial parsing timed out after {}s for job {}",
                    self.stage_timeout.as_secs(),
                    job.id
                );
                return false;
            }
        };

        if let Some(parser_job_id) = &parsed.llamaparse_job_id {
            if let Err(e) = self.db.set_llamaparse_job_id(job.id, parser_job_id) {
                tracing::error!("Failed to record parser job id for job {}: {}", job.id, e);
            }
        }

        let Some(data) = &parsed.extracted_data else {
            tracing::debug!("No structured financial data found for job {}", job.id);
            return false;
        };

        let record = FinancialMetadataRecord::from_extracted(job.document_id, &job.filename, data);
        match self.db.upsert_financial_metadata(&record) {
            Ok(()) => {
                if let Err(e) = self.db.set_financial_data_extracted(job.id, true) {
                    tracing::error!("Failed to set extraction flag for job {}: {}", job.id, e);
                }
                true
            }
            Err(e) => {
                tracing::error!("Failed to store financial metadata for job {}: {}", job.id, e);
                false
            }
        }
    }
}

#[async_trait]
impl JobRunner for DocumentPipeline {
    async fn run(&self, job_id: Uuid) {
        tracing::info!("Starting document processing job {}", job_id);

        let job = match self.db.get_job(job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::error!("Job {} not found", job_id);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to load job {}: {}", job_id, e);
                return;
            }
        };

        // Unexpected errors are converted into terminal job state here;
        // nothing escapes the scheduled task.
        if let Err(e) = self.process(&job).await {
            tracing::error!("Document processing job {} failed: {}", job_id, e);
            self.reporter
                .finish(job_id, false, None, Some(format!("Processing failed: {}", e)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::storage::JobStatus;
    use crate::types::{FinancialData, ParsedFinancialDocument};
    use std::io::Write;

    struct StubParser {
        fail: bool,
    }

    #[async_trait]
    impl FinancialParser for StubParser {
        async fn parse(&self, _document: &DocumentRecord) -> Result<ParsedFinancialDocument> {
            if self.fail {
                return Err(Error::parser("parser exploded"));
            }
            Ok(ParsedFinancialDocument {
                llamaparse_job_id: Some("lp-job-123".to_string()),
                parsed_content: "# Invoice\nTotal: $412.50".to_string(),
                extracted_data: Some(FinancialData {
                    document_type: Some("invoice".to_string()),
                    vendor_name: Some("Acme Lumber LLC".to_string()),
                    total_amount: Some(412.50),
                    currency: Some("USD".to_string()),
                    ..Default::default()
                }),
            })
        }

        fn name(&self) -> &str {
            "stub-parser"
        }
    }

    struct StubIndexer {
        fail: bool,
    }

    #[async_trait]
    impl DocumentIndexer for StubIndexer {
        async fn index(&self, _document: &DocumentRecord) -> Result<()> {
            if self.fail {
                return Err(Error::indexer("chroma unreachable"));
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "stub-indexer"
        }
    }

    struct Fixture {
        db: Arc<JobStoreDb>,
        job: ProcessingJob,
        // Keeps the backing file alive for the duration of a test
        _file: Option<tempfile::NamedTempFile>,
    }

    fn fixture(file_exists: bool) -> Fixture {
        let db = Arc::new(JobStoreDb::in_memory().unwrap());

        let (file, path) = if file_exists {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "ACME LUMBER LLC\nInvoice #INV-9001\nTotal: $412.50").unwrap();
            let path = file.path().to_string_lossy().into_owned();
            (Some(file), path)
        } else {
            (None, "/nonexistent/path/invoice.pdf".to_string())
        };

        let doc = DocumentRecord::new("invoice.pdf".to_string(), path, 64);
        let job = ProcessingJob::new(&doc);
        db.insert_job(&job).unwrap();

        Fixture { db, job, _file: file }
    }

    fn pipeline(
        db: Arc<JobStoreDb>,
        parser_fails: bool,
        indexer_fails: bool,
    ) -> DocumentPipeline {
        DocumentPipeline::new(
            db,
            Some(Arc::new(StubParser { fail: parser_fails })),
            Arc::new(StubIndexer { fail: indexer_fails }),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn missing_file_fails_with_no_partial_progress() {
        let fx = fixture(false);
        let pipeline = pipeline(Arc::clone(&fx.db), false, false);

        pipeline.run(fx.job.id).await;

        let job = fx.db.get_job(fx.job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0.0);
        assert!(job.error_message.unwrap().contains("not found"));
        assert!(!job.financial_data_extracted);
        assert!(!job.indexed_in_chroma);
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn parser_failure_degrades_gracefully() {
        let fx = fixture(true);
        let pipeline = pipeline(Arc::clone(&fx.db), true, false);

        pipeline.run(fx.job.id).await;

        let job = fx.db.get_job(fx.job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert!(!job.financial_data_extracted);
        assert!(job.indexed_in_chroma);
        let result = job.result.unwrap();
        assert!(!result.financial_data_extracted);
        assert!(result.indexed);
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn indexer_failure_is_fatal_after_extraction() {
        let fx = fixture(true);
        let pipeline = pipeline(Arc::clone(&fx.db), false, true);

        pipeline.run(fx.job.id).await;

        let job = fx.db.get_job(fx.job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.financial_data_extracted);
        assert!(!job.indexed_in_chroma);
        assert!(job.result.is_none());
        assert!(job
            .error_message
            .unwrap()
            .contains("Document indexing failed"));
    }

    #[tokio::test]
    async fn successful_run_records_everything() {
        let fx = fixture(true);
        let pipeline = pipeline(Arc::clone(&fx.db), false, false);

        pipeline.run(fx.job.id).await;

        let job = fx.db.get_job(fx.job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.llamaparse_job_id.as_deref(), Some("lp-job-123"));
        assert!(job.financial_data_extracted);
        assert!(job.indexed_in_chroma);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());

        let result = job.result.unwrap();
        assert_eq!(result.document_id, fx.job.document_id);
        assert_eq!(result.filename, "invoice.pdf");
        assert!(result.financial_data_extracted);
        assert!(result.indexed);

        // Enrichment landed in the separately-owned metadata table
        let metadata = fx
            .db
            .get_financial_metadata(fx.job.document_id)
            .unwrap()
            .unwrap();
        assert_eq!(metadata.vendor_name.as_deref(), Some("Acme Lumber LLC"));
        assert_eq!(metadata.total_amount, Some(412.50));
    }

    #[tokio::test]
    async fn missing_parser_completes_without_extraction() {
        let fx = fixture(true);
        let pipeline = DocumentPipeline::new(
            Arc::clone(&fx.db),
            None,
            Arc::new(StubIndexer { fail: false }),
            Duration::from_secs(5),
        );

        pipeline.run(fx.job.id).await;

        let job = fx.db.get_job(fx.job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.financial_data_extracted);
        assert!(job.indexed_in_chroma);
    }

    #[tokio::test]
    async fn unknown_job_is_a_logged_noop() {
        let fx = fixture(true);
        let pipeline = pipeline(Arc::clone(&fx.db), false, false);

        pipeline.run(Uuid::new_v4()).await;

        // The real job is untouched
        let job = fx.db.get_job(fx.job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }
}
