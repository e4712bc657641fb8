//! SQLite job store
//!
//! Durable storage for processing jobs, extracted financial metadata, and the
//! scheduler's persisted task intents. Every update is a single statement, so
//! concurrent writers never observe a partially applied field set.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{DocumentRecord, FinancialData};

/// Job lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Stable string form used in the database and the API
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse a status string; `None` for anything unknown
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Success summary written into a completed job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub document_id: Uuid,
    pub filename: String,
    pub financial_data_extracted: bool,
    pub indexed: bool,
}

/// A document processing job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub status: JobStatus,
    /// Percentage in [0.0, 100.0]
    pub progress: f64,
    pub current_step: Option<String>,
    /// Informational stage count, not used for control flow
    pub total_steps: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
    pub error_message: Option<String>,
    /// Correlation ID assigned by the external parsing service
    pub llamaparse_job_id: Option<String>,
    pub financial_data_extracted: bool,
    pub indexed_in_chroma: bool,
}

impl ProcessingJob {
    /// Create a new pending job from a document snapshot
    pub fn new(document: &DocumentRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document.id,
            filename: document.filename.clone(),
            file_path: document.file_path.clone(),
            file_size: document.file_size,
            status: JobStatus::Pending,
            progress: 0.0,
            current_step: Some("Queued for processing".to_string()),
            total_steps: 4,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
            llamaparse_job_id: None,
            financial_data_extracted: false,
            indexed_in_chroma: false,
        }
    }
}

/// Aggregate job counts per status
#[derive(Debug, Clone, Serialize)]
pub struct JobStoreStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStoreStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// Extracted financial metadata, keyed one-to-one by document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialMetadataRecord {
    pub id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub document_type: Option<String>,
    pub vendor_name: Option<String>,
    pub total_amount: Option<f64>,
    pub invoice_date: Option<DateTime<Utc>>,
    pub currency: Option<String>,
    pub project_name: Option<String>,
    /// Line items as stored JSON
    pub expense_categories: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FinancialMetadataRecord {
    /// Build a metadata record from parser output
    pub fn from_extracted(document_id: Uuid, filename: &str, data: &FinancialData) -> Self {
        let expense_categories = if data.line_items.is_empty() {
            None
        } else {
            serde_json::to_value(&data.line_items).ok()
        };

        Self {
            id: Uuid::new_v4(),
            document_id,
            filename: filename.to_string(),
            document_type: data.document_type.clone(),
            vendor_name: data.vendor_name.clone(),
            total_amount: data.total_amount,
            invoice_date: data.issue_date.as_deref().and_then(parse_document_date),
            currency: data.currency.clone(),
            project_name: data.project_name.clone(),
            expense_categories,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Parse a date as printed on a document (ISO first, then US-style)
fn parse_document_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%m-%d-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Utc
                .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
                .single();
        }
    }
    None
}

/// SQLite-backed job store
pub struct JobStoreDb {
    conn: Arc<Mutex<Connection>>,
}

impl JobStoreDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL for concurrent readers while the pipeline writes
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            -- Processing jobs table
            CREATE TABLE IF NOT EXISTS processing_jobs (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                progress REAL NOT NULL DEFAULT 0.0,
                current_step TEXT,
                total_steps INTEGER NOT NULL DEFAULT 4,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                result TEXT,
                error_message TEXT,
                llamaparse_job_id TEXT,
                financial_data_extracted INTEGER NOT NULL DEFAULT 0,
                indexed_in_chroma INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_processing_jobs_status ON processing_jobs(status);
            CREATE INDEX IF NOT EXISTS idx_processing_jobs_document_id ON processing_jobs(document_id);
            CREATE INDEX IF NOT EXISTS idx_processing_jobs_created_at ON processing_jobs(created_at);

            -- Extracted financial metadata, one row per document
            CREATE TABLE IF NOT EXISTS document_metadata (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL UNIQUE,
                filename TEXT NOT NULL,
                document_type TEXT,
                vendor_name TEXT,
                total_amount REAL,
                invoice_date TEXT,
                currency TEXT DEFAULT 'USD',
                project_name TEXT,
                expense_categories TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_document_metadata_vendor ON document_metadata(vendor_name);

            -- Scheduler task intents; the schedule is persisted, not the payload
            CREATE TABLE IF NOT EXISTS scheduled_tasks (
                job_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Job store migrations complete");
        Ok(())
    }

    // ==================== Job Operations ====================

    /// Insert a new job record
    pub fn insert_job(&self, job: &ProcessingJob) -> Result<()> {
        let conn = self.conn.lock();

        let result_json = job
            .result
            .as_ref()
            .map(|r| serde_json::to_string(r).unwrap_or_default());

        conn.execute(
            r#"
            INSERT INTO processing_jobs (
                id, document_id, filename, file_path, file_size, status, progress,
                current_step, total_steps, created_at, started_at, completed_at,
                result, error_message, llamaparse_job_id, financial_data_extracted,
                indexed_in_chroma
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                job.id.to_string(),
                job.document_id.to_string(),
                job.filename,
                job.file_path,
                job.file_size as i64,
                job.status.as_str(),
                job.progress,
                job.current_step,
                job.total_steps as i64,
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
                result_json,
                job.error_message,
                job.llamaparse_job_id,
                job.financial_data_extracted as i64,
                job.indexed_in_chroma as i64,
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to insert job: {}", e)))?;

        Ok(())
    }

    /// Get a job by ID
    pub fn get_job(&self, job_id: Uuid) -> Result<Option<ProcessingJob>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT * FROM processing_jobs WHERE id = ?1")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let record = stmt
            .query_row(params![job_id.to_string()], row_to_job)
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get job: {}", e)))?;

        Ok(record)
    }

    /// List jobs with the given status, newest first
    pub fn jobs_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<ProcessingJob>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT * FROM processing_jobs WHERE status = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![status.as_str(), limit as i64], row_to_job)
            .map_err(|e| Error::Database(format!("Failed to list jobs: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// List the most recent jobs regardless of status, newest first
    pub fn recent_jobs(&self, limit: usize) -> Result<Vec<ProcessingJob>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT * FROM processing_jobs ORDER BY created_at DESC LIMIT ?1")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![limit as i64], row_to_job)
            .map_err(|e| Error::Database(format!("Failed to list jobs: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// Count jobs per status
    pub fn job_stats(&self) -> Result<JobStoreStats> {
        let conn = self.conn.lock();

        let count = |status: &str| -> usize {
            conn.query_row(
                "SELECT COUNT(*) FROM processing_jobs WHERE status = ?1",
                params![status],
                |row| row.get::<_, i64>(0),
            )
            .unwrap_or(0) as usize
        };

        Ok(JobStoreStats {
            pending: count("pending"),
            processing: count("processing"),
            completed: count("completed"),
            failed: count("failed"),
        })
    }

    /// Write progress, step, and status in one statement
    ///
    /// `started_at` is stamped on the first write that moves the job into
    /// `processing`; later writes leave it untouched.
    pub fn update_progress(
        &self,
        job_id: Uuid,
        progress: f64,
        current_step: &str,
        status: JobStatus,
    ) -> Result<()> {
        let conn = self.conn.lock();

        let started_at = if status == JobStatus::Processing {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };

        conn.execute(
            r#"
            UPDATE processing_jobs SET
                progress = ?2,
                current_step = ?3,
                status = ?4,
                started_at = COALESCE(started_at, ?5)
            WHERE id = ?1
            "#,
            params![
                job_id.to_string(),
                progress,
                current_step,
                status.as_str(),
                started_at,
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to update job progress: {}", e)))?;

        Ok(())
    }

    /// Move a job to its terminal state
    ///
    /// Writes status, progress (100 on success, 0 on failure), `completed_at`,
    /// the terminal step label, and exactly one of result/error_message; the
    /// other column is nulled in the same statement.
    pub fn finish_job(
        &self,
        job_id: Uuid,
        success: bool,
        result: Option<&JobResult>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();

        let (status, progress, step) = if success {
            (JobStatus::Completed, 100.0, "Completed")
        } else {
            (JobStatus::Failed, 0.0, "Failed")
        };

        let result_json = if success {
            result.map(|r| serde_json::to_string(r).unwrap_or_default())
        } else {
            None
        };
        let error_message = if success { None } else { error_message };

        conn.execute(
            r#"
            UPDATE processing_jobs SET
                status = ?2,
                progress = ?3,
                completed_at = ?4,
                current_step = ?5,
                result = ?6,
                error_message = ?7
            WHERE id = ?1
            "#,
            params![
                job_id.to_string(),
                status.as_str(),
                progress,
                Utc::now().to_rfc3339(),
                step,
                result_json,
                error_message,
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to finish job: {}", e)))?;

        Ok(())
    }

    /// Record the external parser's correlation ID
    pub fn set_llamaparse_job_id(&self, job_id: Uuid, parser_job_id: &str) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "UPDATE processing_jobs SET llamaparse_job_id = ?2 WHERE id = ?1",
            params![job_id.to_string(), parser_job_id],
        )
        .map_err(|e| Error::Database(format!("Failed to set parser job id: {}", e)))?;

        Ok(())
    }

    /// Record that the enrichment stage stored extracted data
    pub fn set_financial_data_extracted(&self, job_id: Uuid, extracted: bool) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "UPDATE processing_jobs SET financial_data_extracted = ?2 WHERE id = ?1",
            params![job_id.to_string(), extracted as i64],
        )
        .map_err(|e| Error::Database(format!("Failed to set extraction flag: {}", e)))?;

        Ok(())
    }

    /// Record that the document landed in the vector store
    pub fn set_indexed_in_chroma(&self, job_id: Uuid, indexed: bool) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "UPDATE processing_jobs SET indexed_in_chroma = ?2 WHERE id = ?1",
            params![job_id.to_string(), indexed as i64],
        )
        .map_err(|e| Error::Database(format!("Failed to set indexed flag: {}", e)))?;

        Ok(())
    }

    // ==================== Financial Metadata Operations ====================

    /// Insert or update the financial metadata for a document
    pub fn upsert_financial_metadata(&self, record: &FinancialMetadataRecord) -> Result<()> {
        let conn = self.conn.lock();

        let categories_json = record
            .expense_categories
            .as_ref()
            .map(|c| serde_json::to_string(c).unwrap_or_default());

        conn.execute(
            r#"
            INSERT INTO document_metadata (
                id, document_id, filename, document_type, vendor_name, total_amount,
                invoice_date, currency, project_name, expense_categories, created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(document_id) DO UPDATE SET
                document_type = excluded.document_type,
                vendor_name = excluded.vendor_name,
                total_amount = excluded.total_amount,
                invoice_date = excluded.invoice_date,
                currency = excluded.currency,
                project_name = excluded.project_name,
                expense_categories = excluded.expense_categories,
                updated_at = excluded.created_at
            "#,
            params![
                record.id.to_string(),
                record.document_id.to_string(),
                record.filename,
                record.document_type,
                record.vendor_name,
                record.total_amount,
                record.invoice_date.map(|t| t.to_rfc3339()),
                record.currency,
                record.project_name,
                categories_json,
                record.created_at.to_rfc3339(),
                record.updated_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to upsert financial metadata: {}", e)))?;

        Ok(())
    }

    /// Get the financial metadata for a document
    pub fn get_financial_metadata(
        &self,
        document_id: Uuid,
    ) -> Result<Option<FinancialMetadataRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT * FROM document_metadata WHERE document_id = ?1")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let record = stmt
            .query_row(params![document_id.to_string()], row_to_metadata)
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get financial metadata: {}", e)))?;

        Ok(record)
    }

    // ==================== Scheduled Task Operations ====================

    /// Persist the intent to run a job; replaces any existing intent
    pub fn enqueue_task(&self, job_id: Uuid) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO scheduled_tasks (job_id, created_at) VALUES (?1, ?2)",
            params![job_id.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Database(format!("Failed to enqueue task: {}", e)))?;

        Ok(())
    }

    /// List persisted task intents, oldest first
    pub fn pending_tasks(&self) -> Result<Vec<Uuid>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT job_id FROM scheduled_tasks ORDER BY created_at ASC")
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let ids = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                Ok(id)
            })
            .map_err(|e| Error::Database(format!("Failed to list pending tasks: {}", e)))?
            .filter_map(|r| r.ok())
            .filter_map(|s| Uuid::parse_str(&s).ok())
            .collect();

        Ok(ids)
    }

    /// Remove a task intent after its job has run
    pub fn remove_task(&self, job_id: Uuid) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "DELETE FROM scheduled_tasks WHERE job_id = ?1",
            params![job_id.to_string()],
        )
        .map_err(|e| Error::Database(format!("Failed to remove task: {}", e)))?;

        Ok(())
    }
}

// Row mappers

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<ProcessingJob> {
    let id_str: String = row.get(0)?;
    let document_id_str: String = row.get(1)?;
    let filename: String = row.get(2)?;
    let file_path: String = row.get(3)?;
    let file_size: i64 = row.get(4)?;
    let status_str: String = row.get(5)?;
    let progress: f64 = row.get(6)?;
    let current_step: Option<String> = row.get(7)?;
    let total_steps: i64 = row.get(8)?;
    let created_at_str: String = row.get(9)?;
    let started_at_str: Option<String> = row.get(10)?;
    let completed_at_str: Option<String> = row.get(11)?;
    let result_json: Option<String> = row.get(12)?;
    let error_message: Option<String> = row.get(13)?;
    let llamaparse_job_id: Option<String> = row.get(14)?;
    let financial_data_extracted: i64 = row.get(15)?;
    let indexed_in_chroma: i64 = row.get(16)?;

    Ok(ProcessingJob {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
        document_id: Uuid::parse_str(&document_id_str).unwrap_or_else(|_| Uuid::new_v4()),
        filename,
        file_path,
        file_size: file_size as u64,
        status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Failed),
        progress,
        current_step,
        total_steps: total_steps as u32,
        created_at: parse_timestamp(&created_at_str),
        started_at: started_at_str.as_deref().map(parse_timestamp),
        completed_at: completed_at_str.as_deref().map(parse_timestamp),
        result: result_json.and_then(|j| serde_json::from_str(&j).ok()),
        error_message,
        llamaparse_job_id,
        financial_data_extracted: financial_data_extracted != 0,
        indexed_in_chroma: indexed_in_chroma != 0,
    })
}

fn row_to_metadata(row: &rusqlite::Row) -> rusqlite::Result<FinancialMetadataRecord> {
    let id_str: String = row.get(0)?;
    let document_id_str: String = row.get(1)?;
    let filename: String = row.get(2)?;
    let document_type: Option<String> = row.get(3)?;
    let vendor_name: Option<String> = row.get(4)?;
    let total_amount: Option<f64> = row.get(5)?;
    let invoice_date_str: Option<String> = row.get(6)?;
    let currency: Option<String> = row.get(7)?;
    let project_name: Option<String> = row.get(8)?;
    let categories_json: Option<String> = row.get(9)?;
    let created_at_str: String = row.get(10)?;
    let updated_at_str: Option<String> = row.get(11)?;

    Ok(FinancialMetadataRecord {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
        document_id: Uuid::parse_str(&document_id_str).unwrap_or_else(|_| Uuid::new_v4()),
        filename,
        document_type,
        vendor_name,
        total_amount,
        invoice_date: invoice_date_str.as_deref().map(parse_timestamp),
        currency,
        project_name,
        expense_categories: categories_json.and_then(|j| serde_json::from_str(&j).ok()),
        created_at: parse_timestamp(&created_at_str),
        updated_at: updated_at_str.as_deref().map(parse_timestamp),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_job(filename: &str) -> ProcessingJob {
        let doc = DocumentRecord::new(
            filename.to_string(),
            format!("uploads/documents/{}", filename),
            2048,
        );
        ProcessingJob::new(&doc)
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let db = JobStoreDb::in_memory().unwrap();
        let job = make_job("invoice.pdf");

        db.insert_job(&job).unwrap();

        let stored = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.id, job.id);
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.progress, 0.0);
        assert_eq!(stored.current_step.as_deref(), Some("Queued for processing"));
        assert!(stored.started_at.is_none());
        assert!(stored.result.is_none());
        assert!(stored.error_message.is_none());
    }

    #[test]
    fn get_unknown_job_returns_none() {
        let db = JobStoreDb::in_memory().unwrap();
        assert!(db.get_job(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn update_progress_stamps_started_at_once() {
        let db = JobStoreDb::in_memory().unwrap();
        let job = make_job("invoice.pdf");
        db.insert_job(&job).unwrap();

        db.update_progress(job.id, 10.0, "Validating file", JobStatus::Processing)
            .unwrap();
        let first = db.get_job(job.id).unwrap().unwrap();
        let started_at = first.started_at.expect("started_at stamped");

        db.update_progress(job.id, 40.0, "Extracting financial data", JobStatus::Processing)
            .unwrap();
        let second = db.get_job(job.id).unwrap().unwrap();

        assert_eq!(second.started_at, Some(started_at));
        assert_eq!(second.progress, 40.0);
        assert_eq!(second.status, JobStatus::Processing);
    }

    #[test]
    fn update_progress_is_idempotent() {
        let db = JobStoreDb::in_memory().unwrap();
        let job = make_job("invoice.pdf");
        db.insert_job(&job).unwrap();

        db.update_progress(job.id, 25.0, "Preparing document", JobStatus::Processing)
            .unwrap();
        let first = db.get_job(job.id).unwrap().unwrap();

        db.update_progress(job.id, 25.0, "Preparing document", JobStatus::Processing)
            .unwrap();
        let second = db.get_job(job.id).unwrap().unwrap();

        assert_eq!(first.progress, second.progress);
        assert_eq!(first.current_step, second.current_step);
        assert_eq!(first.status, second.status);
        assert_eq!(first.started_at, second.started_at);
    }

    #[test]
    fn finish_success_writes_result_only() {
        let db = JobStoreDb::in_memory().unwrap();
        let job = make_job("invoice.pdf");
        db.insert_job(&job).unwrap();

        let result = JobResult {
            document_id: job.document_id,
            filename: job.filename.clone(),
            financial_data_extracted: true,
            indexed: true,
        };
        db.finish_job(job.id, true, Some(&result), None).unwrap();

        let stored = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.progress, 100.0);
        assert_eq!(stored.current_step.as_deref(), Some("Completed"));
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.result, Some(result));
        assert!(stored.error_message.is_none());
    }

    #[test]
    fn finish_failure_writes_error_only() {
        let db = JobStoreDb::in_memory().unwrap();
        let job = make_job("invoice.pdf");
        db.insert_job(&job).unwrap();

        db.finish_job(job.id, false, None, Some("Document indexing failed: boom"))
            .unwrap();

        let stored = db.get_job(job.id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.progress, 0.0);
        assert_eq!(stored.current_step.as_deref(), Some("Failed"));
        assert!(stored.completed_at.is_some());
        assert!(stored.result.is_none());
        assert_eq!(
            stored.error_message.as_deref(),
            Some("Document indexing failed: boom")
        );
    }

    #[test]
    fn jobs_by_status_newest_first_with_limit() {
        let db = JobStoreDb::in_memory().unwrap();

        let base = Utc::now();
        for i in 0..5 {
            let mut job = make_job(&format!("doc{}.pdf", i));
            job.created_at = base + Duration::seconds(i);
            db.insert_job(&job).unwrap();
        }

        let jobs = db.jobs_by_status(JobStatus::Pending, 3).unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].filename, "doc4.pdf");
        assert_eq!(jobs[1].filename, "doc3.pdf");
        assert_eq!(jobs[2].filename, "doc2.pdf");
    }

    #[test]
    fn recent_jobs_spans_statuses() {
        let db = JobStoreDb::in_memory().unwrap();

        let base = Utc::now();
        let mut older = make_job("older.pdf");
        older.created_at = base;
        db.insert_job(&older).unwrap();

        let mut newer = make_job("newer.pdf");
        newer.created_at = base + Duration::seconds(1);
        db.insert_job(&newer).unwrap();
        db.finish_job(newer.id, false, None, Some("x")).unwrap();

        let jobs = db.recent_jobs(10).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].filename, "newer.pdf");
    }

    #[test]
    fn stats_count_per_status() {
        let db = JobStoreDb::in_memory().unwrap();

        let pending = make_job("a.pdf");
        db.insert_job(&pending).unwrap();

        let completed = make_job("b.pdf");
        db.insert_job(&completed).unwrap();
        let result = JobResult {
            document_id: completed.document_id,
            filename: completed.filename.clone(),
            financial_data_extracted: false,
            indexed: true,
        };
        db.finish_job(completed.id, true, Some(&result), None).unwrap();

        let failed = make_job("c.pdf");
        db.insert_job(&failed).unwrap();
        db.finish_job(failed.id, false, None, Some("x")).unwrap();

        let stats = db.job_stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn task_intents_enqueue_list_remove() {
        let db = JobStoreDb::in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        db.enqueue_task(a).unwrap();
        db.enqueue_task(b).unwrap();
        // Re-enqueue replaces rather than duplicating
        db.enqueue_task(a).unwrap();

        let pending = db.pending_tasks().unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.contains(&a));
        assert!(pending.contains(&b));

        db.remove_task(a).unwrap();
        let pending = db.pending_tasks().unwrap();
        assert_eq!(pending, vec![b]);
    }

    #[test]
    fn financial_metadata_upsert_updates_in_place() {
        let db = JobStoreDb::in_memory().unwrap();
        let document_id = Uuid::new_v4();

        let data = FinancialData {
            document_type: Some("invoice".to_string()),
            vendor_name: Some("Acme Lumber LLC".to_string()),
            total_amount: Some(412.50),
            ..Default::default()
        };
        let record = FinancialMetadataRecord::from_extracted(document_id, "invoice.pdf", &data);
        db.upsert_financial_metadata(&record).unwrap();

        let updated_data = FinancialData {
            total_amount: Some(499.99),
            ..data
        };
        let second =
            FinancialMetadataRecord::from_extracted(document_id, "invoice.pdf", &updated_data);
        db.upsert_financial_metadata(&second).unwrap();

        let stored = db.get_financial_metadata(document_id).unwrap().unwrap();
        assert_eq!(stored.total_amount, Some(499.99));
        assert!(stored.updated_at.is_some());
    }

    #[test]
    fn document_dates_parse_common_formats() {
        assert!(parse_document_date("2025-11-04").is_some());
        assert!(parse_document_date("11/04/2025").is_some());
        assert!(parse_document_date("2025-11-04T12:00:00Z").is_some());
        assert!(parse_document_date("last tuesday").is_none());
    }
}
