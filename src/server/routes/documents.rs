//! Document upload endpoint
//!
//! Uploaded files are validated, written to the documents directory, and
//! handed to the job service for background processing.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::DocumentRecord;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document: DocumentRecord,
    pub job_id: Uuid,
    pub message: String,
}

/// POST /api/documents/upload - Upload a document for async processing
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let storage = &state.config().storage;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Failed to read multipart field: {}", e)))?
    {
        let Some(filename) = field.file_name().map(|s| s.to_string()) else {
            continue;
        };

        if !storage.is_allowed(&filename) {
            return Err(Error::validation(format!(
                "File type not allowed. Supported types: {}",
                storage.allowed_extensions.join(", ")
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::validation(format!("Failed to read file {}: {}", filename, e)))?;

        if data.len() as u64 > storage.max_file_size {
            return Err(Error::validation(format!(
                "File too large. Maximum size: {} bytes",
                storage.max_file_size
            )));
        }

        let document_id = Uuid::new_v4();
        let stored_name = format!("{}_{}", document_id, filename);
        let file_path = storage.documents_dir.join(stored_name);

        tokio::fs::write(&file_path, &data).await?;
        tracing::info!("Stored upload {} ({} bytes)", file_path.display(), data.len());

        let document = DocumentRecord::with_id(
            document_id,
            filename,
            file_path.to_string_lossy().into_owned(),
            data.len() as u64,
        );

        let job_id = match state.job_service().create_job(&document).await {
            Ok(job_id) => job_id,
            Err(e) => {
                // Don't leave an orphaned file behind when the job was never created
                let _ = tokio::fs::remove_file(&file_path).await;
                return Err(e);
            }
        };

        return Ok(Json(UploadResponse {
            document,
            job_id,
            message: format!(
                "Document queued for processing. Use /api/jobs/progress/{} to check progress.",
                job_id
            ),
        }));
    }

    Err(Error::validation("No file provided"))
}
