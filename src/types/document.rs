//! Document types shared between the upload surface and the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Snapshot of an uploaded document handed to the processing pipeline
///
/// Descriptive fields are copied into the job at creation time and are not
/// re-read from this record later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub filename: String,
    pub file_path: String,
    pub content_type: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub indexed: bool,
}

impl DocumentRecord {
    /// Create a new document record; the content type is guessed from the filename
    pub fn new(filename: String, file_path: String, file_size: u64) -> Self {
        Self::with_id(Uuid::new_v4(), filename, file_path, file_size)
    }

    /// Create a document record with a caller-assigned ID
    pub fn with_id(id: Uuid, filename: String, file_path: String, file_size: u64) -> Self {
        let content_type = mime_guess::from_path(Path::new(&filename))
            .first_or_octet_stream()
            .to_string();

        Self {
            id,
            filename,
            file_path,
            content_type,
            file_size,
            uploaded_at: Utc::now(),
            indexed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_guessed_from_filename() {
        let doc = DocumentRecord::new(
            "invoice.pdf".to_string(),
            "uploads/documents/invoice.pdf".to_string(),
            1024,
        );
        assert_eq!(doc.content_type, "application/pdf");
        assert!(!doc.indexed);
    }

    #[test]
    fn unknown_extension_falls_back_to_octet_stream() {
        let doc = DocumentRecord::new("weird.xyz123".to_string(), "x".to_string(), 1);
        assert_eq!(doc.content_type, "application/octet-stream");
    }
}
