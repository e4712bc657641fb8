//! Vector store indexing via the Chroma HTTP API
//!
//! Documents are chunked and added to a single collection. Existing chunks
//! for a document are deleted before adding, so re-indexing the same
//! document replaces rather than appends.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::IndexerConfig;
use crate::error::{Error, Result};
use crate::types::DocumentRecord;

/// Indexes a document into the search/vector store
///
/// Errors from this collaborator are hard: the pipeline fails the job.
#[async_trait]
pub trait DocumentIndexer: Send + Sync {
    async fn index(&self, document: &DocumentRecord) -> Result<()>;

    /// Provider name for diagnostics
    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
}

/// Chroma HTTP client
pub struct ChromaIndexer {
    client: Client,
    config: IndexerConfig,
    /// Resolved collection ID, cached after the first call
    collection_id: Mutex<Option<String>>,
}

impl ChromaIndexer {
    pub fn new(config: &IndexerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config: config.clone(),
            collection_id: Mutex::new(None),
        }
    }

    /// Get or create the configured collection and cache its ID
    async fn collection_id(&self) -> Result<String> {
        if let Some(id) = self.collection_id.lock().clone() {
            return Ok(id);
        }

        let response = self
            .client
            .post(format!("{}/api/v1/collections", self.config.base_url))
            .json(&json!({
                "name": self.config.collection,
                "get_or_create": true,
            }))
            .send()
            .await
            .map_err(|e| Error::indexer(format!("Collection request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::indexer(format!(
                "Collection request rejected: {} - {}",
                status, body
            )));
        }

        let collection: CollectionResponse = response
            .json()
            .await
            .map_err(|e| Error::indexer(format!("Invalid collection response: {}", e)))?;

        *self.collection_id.lock() = Some(collection.id.clone());
        Ok(collection.id)
    }

    /// Delete any chunks previously indexed for this document
    async fn delete_existing(&self, collection_id: &str, document: &DocumentRecord) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/api/v1/collections/{}/delete",
                self.config.base_url, collection_id
            ))
            .json(&json!({
                "where": { "document_id": document.id.to_string() },
            }))
            .send()
            .await
            .map_err(|e| Error::indexer(format!("Delete request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::indexer(format!(
                "Delete request rejected: {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl DocumentIndexer for ChromaIndexer {
    async fn index(&self, document: &DocumentRecord) -> Result<()> {
        let data = tokio::fs::read(&document.file_path).await.map_err(|e| {
            Error::indexer(format!("Failed to read {}: {}", document.file_path, e))
        })?;
        let text = String::from_utf8_lossy(&data);

        let chunks = chunk_text(&text, self.config.chunk_size, self.config.chunk_overlap);
        if chunks.is_empty() {
            return Err(Error::indexer(format!(
                "No indexable content in {}",
                document.filename
            )));
        }

        let collection_id = self.collection_id().await?;
        self.delete_existing(&collection_id, document).await?;

        let ids: Vec<String> = (0..chunks.len())
            .map(|i| format!("{}-{}", document.id, i))
            .collect();
        let metadatas: Vec<serde_json::Value> = (0..chunks.len())
            .map(|i| {
                json!({
                    "document_id": document.id.to_string(),
                    "filename": document.filename,
                    "chunk_index": i,
                })
            })
            .collect();

        let response = self
            .client
            .post(format!(
                "{}/api/v1/collections/{}/add",
                self.config.base_url, collection_id
            ))
            .json(&json!({
                "ids": ids,
                "documents": chunks,
                "metadatas": metadatas,
            }))
            .send()
            .await
            .map_err(|e| Error::indexer(format!("Add request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::indexer(format!(
                "Add request rejected: {} - {}",
                status, body
            )));
        }

        tracing::info!(
            "Indexed {} ({} chunks) into collection {}",
            document.filename,
            ids.len(),
            self.config.collection
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "chroma"
    }
}

/// Split text into overlapping chunks on character boundaries
fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_respect_size_and_overlap() {
        let text = "a".repeat(2500);
        let chunks = chunk_text(&text, 1000, 200);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        // Final chunk carries the remainder plus the overlap
        assert_eq!(chunks[2].len(), 2500 - 2 * 800);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 1000, 200);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn empty_and_whitespace_text_produce_no_chunks() {
        assert!(chunk_text("", 1000, 200).is_empty());
        assert!(chunk_text("   \n  ", 1000, 200).is_empty());
    }

    #[test]
    fn multibyte_text_chunks_on_char_boundaries() {
        let text = "é".repeat(1500);
        let chunks = chunk_text(&text, 1000, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_eq!(chunks[1].chars().count(), 500);
    }
}
