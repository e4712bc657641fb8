//! Job tracking and progress endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::jobs::JobProgress;
use crate::server::state::AppState;
use crate::storage::{JobStatus, JobStoreStats, ProcessingJob};

/// GET /api/jobs/status/:id - Full snapshot of one job
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ProcessingJob>> {
    let job = state
        .job_service()
        .job_status(job_id)?
        .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;

    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    status: String,
    #[serde(default = "default_status_limit")]
    limit: usize,
}

fn default_status_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct JobsByStatusResponse {
    pub status: JobStatus,
    pub count: usize,
    pub jobs: Vec<ProcessingJob>,
}

/// GET /api/jobs/status?status=&limit= - Jobs filtered by status, newest first
pub async fn get_jobs_by_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<JobsByStatusResponse>> {
    let status = JobStatus::parse(&query.status).ok_or_else(|| {
        Error::validation(format!(
            "Invalid status '{}'. Must be one of: pending, processing, completed, failed",
            query.status
        ))
    })?;

    let jobs = state.job_service().jobs_by_status(status, query.limit)?;

    Ok(Json(JobsByStatusResponse {
        status,
        count: jobs.len(),
        jobs,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

fn default_recent_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct RecentJobsResponse {
    pub count: usize,
    pub jobs: Vec<ProcessingJob>,
}

/// GET /api/jobs/recent?limit= - Most recent jobs regardless of status
pub async fn get_recent_jobs(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<RecentJobsResponse>> {
    let jobs = state.job_service().recent_jobs(query.limit)?;

    Ok(Json(RecentJobsResponse {
        count: jobs.len(),
        jobs,
    }))
}

#[derive(Debug, Serialize)]
pub struct JobStatsResponse {
    pub total_jobs: usize,
    pub by_status: JobStoreStats,
    pub last_updated: String,
}

/// GET /api/jobs/stats - Aggregate job counts
pub async fn get_job_stats(State(state): State<AppState>) -> Result<Json<JobStatsResponse>> {
    let stats = state.job_service().stats()?;

    Ok(Json(JobStatsResponse {
        total_jobs: stats.total(),
        by_status: stats,
        last_updated: Utc::now().to_rfc3339(),
    }))
}

/// GET /api/jobs/progress/:id - Reduced view for polling clients
pub async fn get_job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobProgress>> {
    let progress = state
        .job_service()
        .job_progress(job_id)?
        .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;

    Ok(Json(progress))
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub message: String,
    pub note: String,
}

/// DELETE /api/jobs/:id - Request cancellation of a non-terminal job
///
/// The request is accepted but has no effect on an already-dispatched
/// pipeline; the job runs to its own terminal state.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CancelJobResponse>> {
    let job = state
        .job_service()
        .job_status(job_id)?
        .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;

    if job.status.is_terminal() {
        return Err(Error::validation(format!(
            "Cannot cancel job in status: {}",
            job.status.as_str()
        )));
    }

    Ok(Json(CancelJobResponse {
        message: format!("Job cancellation requested for {}", job_id),
        note: "A dispatched pipeline is not interrupted; the job will still run to completion"
            .to_string(),
    }))
}
