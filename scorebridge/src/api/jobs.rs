//! Administrative job endpoints
//!
//! GET /api/jobs lists jobs (optionally filtered by pipeline kind);
//! DELETE /api/jobs/{job_id} removes a record. Neither is part of the
//! normal conversion flow.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{Job, PipelineKind},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:job_id", delete(delete_job))
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    kind: Option<PipelineKind>,
}

#[derive(Debug, Serialize)]
struct JobListResponse {
    jobs: Vec<Job>,
    count: usize,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Json<JobListResponse> {
    let jobs = state.registry.list(query.kind);
    let count = jobs.len();
    Json(JobListResponse { jobs, count })
}

async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    if state.registry.delete(job_id) {
        Ok(Json(json!({ "job_id": job_id, "deleted": true })))
    } else {
        Err(ApiError::NotFound(format!("Job not found: {job_id}")))
    }
}
