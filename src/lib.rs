//! Penny: financial document analysis service
//!
//! Asynchronous document ingestion with background job orchestration:
//! uploaded invoices and receipts are queued, parsed for financial data via
//! an external OCR service, indexed into a vector store, and observable
//! through a polling API. Job state survives process restarts.

pub mod config;
pub mod error;
pub mod jobs;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

pub use config::PennyConfig;
pub use error::{Error, Result};
pub use storage::{JobStatus, JobStoreDb, ProcessingJob};
