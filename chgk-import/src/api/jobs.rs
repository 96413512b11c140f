//! Job endpoints
//!
//! POST /jobs, GET /jobs/:id, GET /jobs?owner_id=

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::db::jobs::{insert_job, list_jobs_for_owner, load_job};
use crate::error::{ApiError, ApiResult, ErrorKind};
use crate::models::{ImportJob, ImportStep, JobStatus};

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

/// POST /jobs request
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub owner_id: String,
    /// Path of the already stored upload
    pub file_path: String,
}

/// GET /jobs query
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub owner_id: String,
    pub limit: Option<u32>,
}

/// Job as reported to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub owner_id: String,
    pub original_file_name: String,
    pub status: JobStatus,
    pub current_step: ImportStep,
    pub progress: u8,
    pub attempts: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub package_id: Option<Uuid>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<ImportJob> for JobResponse {
    fn from(job: ImportJob) -> Self {
        Self {
            id: job.id,
            owner_id: job.owner_id,
            original_file_name: job.original_file_name,
            status: job.status,
            current_step: job.current_step,
            progress: job.progress,
            attempts: job.attempts,
            next_retry_at: job.next_retry_at,
            package_id: job.package_id,
            error: job.error,
            error_kind: job.error_kind,
            warnings: job.warnings,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// POST /jobs
///
/// Registers a stored upload as a QUEUED job. Returns 202 Accepted.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    if request.owner_id.trim().is_empty() {
        return Err(ApiError::BadRequest("owner_id is required".to_string()));
    }

    let path = std::path::Path::new(&request.file_path);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ApiError::BadRequest("file_path has no file name".to_string()))?;

    if !state.accepts_file(file_name) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported file type; accepted: {}",
            state.supported_extensions.join(", ")
        )));
    }

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| ApiError::BadRequest(format!("File not found: {}", request.file_path)))?;
    if !metadata.is_file() {
        return Err(ApiError::BadRequest(format!("Not a file: {}", request.file_path)));
    }

    let max_bytes = state.settings.max_file_size_bytes;
    if metadata.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "File is {} bytes, limit is {} bytes",
            metadata.len(),
            max_bytes
        )));
    }

    let job = ImportJob::new(request.owner_id.trim(), path);
    insert_job(&state.db, &job).await?;

    tracing::info!(
        job_id = %job.id,
        owner_id = %job.owner_id,
        file = %job.original_file_name,
        size_bytes = metadata.len(),
        "Import job queued"
    );

    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

/// GET /jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid job id: {}", id)))?;

    let job = load_job(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job {}", id)))?;

    Ok(Json(job.into()))
}

/// GET /jobs?owner_id=...&limit=...
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<JobResponse>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let jobs = list_jobs_for_owner(&state.db, &query.owner_id, limit).await?;
    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

/// Build job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/:id", get(get_job))
}
