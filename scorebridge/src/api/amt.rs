//! Audio-to-score (AMT) endpoints
//!
//! POST /api/amt/upload, GET /api/amt/status/{job_id},
//! GET /api/amt/download/{job_id}

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::UploadResponse,
    error::{ApiError, ApiResult},
    models::{Job, JobStatus, PipelineKind},
    pipeline::StatusCallback,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/status/:job_id", get(status))
        .route("/download/:job_id", get(download))
}

/// POST /api/amt/upload
///
/// Multipart field: `file` (required audio clip). Validates the extension
/// before any job exists, stages the bytes, creates the job, and fires
/// off the pipeline run in the background.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        if name.as_deref() == Some("file") {
            let filename = field
                .file_name()
                .map(str::to_owned)
                .ok_or_else(|| ApiError::Validation("File field has no filename".into()))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("Failed to read upload: {e}")))?;
            file = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::Validation("Missing 'file' field".into()))?;

    if !state
        .staging
        .validate_extension(&filename, &state.config.amt_extensions)
    {
        return Err(ApiError::Validation(format!(
            "Unsupported file type. Allowed: {}",
            state.config.amt_extensions.join(", ")
        )));
    }

    let (job_id, upload_path) = state.staging.save_upload(&bytes, &filename)?;
    state
        .registry
        .create_with_id(job_id, PipelineKind::Amt, &filename, upload_path.clone());

    spawn_pipeline_run(state, job_id, upload_path);

    Ok(Json(UploadResponse {
        job_id,
        status: "uploaded",
        message: "File uploaded successfully. Processing started.",
    }))
}

fn spawn_pipeline_run(state: AppState, job_id: Uuid, upload_path: PathBuf) {
    tokio::spawn(async move {
        let Ok(_permit) = state.job_permits.clone().acquire_owned().await else {
            tracing::error!(job_id = %job_id, "job semaphore closed, dropping job");
            return;
        };

        let registry = state.registry.clone();
        let on_status: StatusCallback = Arc::new({
            let registry = registry.clone();
            move |id, update| {
                registry.update(id, update);
            }
        });

        match state
            .audio_to_score
            .process(&upload_path, job_id, &on_status)
            .await
        {
            Ok(output) => {
                registry.mark_completed(job_id, output);
                tracing::info!(job_id = %job_id, "audio-to-score job completed");
            }
            Err(err) => {
                registry.mark_failed(job_id, err.to_string());
                tracing::error!(job_id = %job_id, error = %err, "audio-to-score job failed");
            }
        }
    });
}

/// GET /api/amt/status/{job_id}
async fn status(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> ApiResult<Json<Job>> {
    state
        .registry
        .get(job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {job_id}")))
}

/// GET /api/amt/download/{job_id}
///
/// Serves the engraved PDF once the job is completed.
async fn download(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> ApiResult<Response> {
    let job = state
        .registry
        .get(job_id)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {job_id}")))?;

    if job.status != JobStatus::Completed {
        return Err(ApiError::JobNotReady(format!(
            "Job is not complete. Current status: {}",
            job.status
        )));
    }

    let output_path = job
        .output_path
        .ok_or_else(|| ApiError::NotFound("Output file not found".into()))?;
    let bytes = tokio::fs::read(&output_path)
        .await
        .map_err(|_| ApiError::NotFound("Output file not found".into()))?;

    let stem = std::path::Path::new(&job.filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{stem}_score.pdf\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}
