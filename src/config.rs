//! Configuration for the document processing service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PennyConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload/document storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Job store database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// External financial parser (LlamaParse) configuration
    #[serde(default)]
    pub parser: ParserConfig,
    /// Vector store (Chroma) configuration
    #[serde(default)]
    pub indexer: IndexerConfig,
    /// Background processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl PennyConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Maximum upload request size in bytes
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_upload_size: 25 * 1024 * 1024, // 25MB request bodies
        }
    }
}

/// Upload and document storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root upload directory
    pub upload_dir: PathBuf,
    /// Directory where document files are stored
    pub documents_dir: PathBuf,
    /// Maximum size of a single uploaded file in bytes
    pub max_file_size: u64,
    /// Allowed file extensions (lowercase, with leading dot)
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            documents_dir: PathBuf::from("uploads/documents"),
            max_file_size: 10 * 1024 * 1024, // 10MB
            allowed_extensions: vec![
                ".pdf".to_string(),
                ".png".to_string(),
                ".jpg".to_string(),
                ".jpeg".to_string(),
                ".txt".to_string(),
                ".docx".to_string(),
            ],
        }
    }
}

impl StorageConfig {
    /// Check whether a filename carries an allowed extension
    pub fn is_allowed(&self, filename: &str) -> bool {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()));
        match ext {
            Some(ext) => self.allowed_extensions.iter().any(|a| a == &ext),
            None => false,
        }
    }
}

/// Job store database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/penny.db"),
        }
    }
}

/// External financial parser (LlamaParse) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// API key; falls back to the LLAMA_CLOUD_API_KEY environment variable
    pub api_key: Option<String>,
    /// Parsing API base URL
    pub base_url: String,
    /// Interval between result polls in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum number of result polls before giving up
    pub max_poll_attempts: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.cloud.llamaindex.ai".to_string(),
            poll_interval_ms: 2000,
            max_poll_attempts: 60,
        }
    }
}

impl ParserConfig {
    /// Resolve the API key from config or environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("LLAMA_CLOUD_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

/// Vector store (Chroma) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Chroma server base URL
    pub base_url: String,
    /// Collection name documents are indexed into
    pub collection: String,
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks in characters
    pub chunk_overlap: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            collection: "penny_documents".to_string(),
            chunk_size: 1024,
            chunk_overlap: 200,
        }
    }
}

/// Background processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum number of pipelines running concurrently; excess jobs queue
    pub max_concurrent_jobs: usize,
    /// Timeout for a single external stage call (parse, index) in seconds
    pub stage_timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            stage_timeout_secs: 300, // 5 minutes
        }
    }
}
