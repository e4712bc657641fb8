//! API routes for the document processing server

pub mod documents;
pub mod jobs;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Document upload - with larger body limit for multipart
        .route(
            "/documents/upload",
            post(documents::upload_document).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Job tracking
        .route("/jobs/status/:id", get(jobs::get_job_status))
        .route("/jobs/status", get(jobs::get_jobs_by_status))
        .route("/jobs/recent", get(jobs::get_recent_jobs))
        .route("/jobs/stats", get(jobs::get_job_stats))
        .route("/jobs/progress/:id", get(jobs::get_job_progress))
        .route("/jobs/:id", delete(jobs::cancel_job))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "penny",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Financial document analysis with async ingestion and progress tracking",
        "endpoints": {
            "POST /api/documents/upload": "Upload a document for async processing",
            "GET /api/jobs/status/:id": "Full job snapshot",
            "GET /api/jobs/status?status=&limit=": "Jobs filtered by status",
            "GET /api/jobs/recent?limit=": "Most recent jobs",
            "GET /api/jobs/stats": "Aggregate job counts",
            "GET /api/jobs/progress/:id": "Reduced progress view for polling",
            "DELETE /api/jobs/:id": "Request job cancellation"
        }
    }))
}
