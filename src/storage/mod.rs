//! Storage module for persistent job and metadata state
//!
//! Provides SQLite-based persistence for processing jobs, extracted financial
//! metadata, and scheduler task intents.

mod database;

pub use database::{
    FinancialMetadataRecord, JobResult, JobStatus, JobStoreDb, JobStoreStats, ProcessingJob,
};
