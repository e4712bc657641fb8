//! Application state for the document processing server

use std::sync::Arc;
use std::time::Duration;

use crate::config::PennyConfig;
use crate::error::Result;
use crate::jobs::{DocumentPipeline, JobService, Scheduler};
use crate::providers::{ChromaIndexer, DocumentIndexer, FinancialParser, LlamaParseClient};
use crate::storage::JobStoreDb;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PennyConfig,
    db: Arc<JobStoreDb>,
    scheduler: Arc<Scheduler>,
    job_service: JobService,
}

impl AppState {
    /// Create the application state and start the scheduler
    ///
    /// Fails loudly if the job store or the scheduler cannot be initialized;
    /// the service must not accept jobs in a half-initialized state.
    pub fn new(config: PennyConfig) -> Result<Self> {
        tracing::info!("Initializing application state...");

        std::fs::create_dir_all(&config.storage.documents_dir)?;
        if let Some(parent) = config.database.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Arc::new(JobStoreDb::new(&config.database.path)?);
        tracing::info!("Job store opened at {}", config.database.path.display());

        // The parser is optional: without an API key, jobs still run and
        // complete without financial extraction.
        let parser: Option<Arc<dyn FinancialParser>> = match LlamaParseClient::new(&config.parser) {
            Ok(client) => {
                tracing::info!("Financial parser initialized");
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("Financial parser not available: {}", e);
                None
            }
        };

        let indexer: Arc<dyn DocumentIndexer> = Arc::new(ChromaIndexer::new(&config.indexer));
        tracing::info!("Indexer initialized ({})", config.indexer.base_url);

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&db),
            config.processing.max_concurrent_jobs,
        ));

        let pipeline = Arc::new(DocumentPipeline::new(
            Arc::clone(&db),
            parser,
            indexer,
            Duration::from_secs(config.processing.stage_timeout_secs),
        ));
        scheduler.initialize(pipeline)?;

        let job_service = JobService::new(Arc::clone(&db), Arc::clone(&scheduler));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                scheduler,
                job_service,
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &PennyConfig {
        &self.inner.config
    }

    /// Get the job store
    pub fn db(&self) -> &Arc<JobStoreDb> {
        &self.inner.db
    }

    /// Get the job service
    pub fn job_service(&self) -> &JobService {
        &self.inner.job_service
    }

    /// Whether the scheduler is accepting jobs
    pub fn is_ready(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    /// Stop the scheduler; in-flight jobs finish
    pub fn shutdown(&self) {
        self.inner.scheduler.shutdown();
    }
}
