//! Score-to-audio (OMR) endpoints
//!
//! POST /api/omr/upload, GET /api/omr/status/{job_id},
//! GET /api/omr/download/{job_id}

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
    models::{Instrument, Job, JobStatus, PipelineKind},
    pipeline::StatusCallback,
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/status/:job_id", get(status))
        .route("/download/:job_id", get(download))
}

/// POST /api/omr/upload
///
/// Multipart fields: `file` (required image/PDF), `instrument` (optional;
/// unknown names fall back to piano). Validates the extension before any
/// job exists, stages the bytes, creates the job, and fires off the
/// pipeline run in the background.
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut instrument = Instrument::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
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
            Some("instrument") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(format!("Invalid instrument field: {e}")))?;
                instrument = Instrument::parse(&text);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::Validation("Missing 'file' field".into()))?;

    if !state
        .staging
        .validate_extension(&filename, &state.config.omr_extensions)
    {
        return Err(ApiError::Validation(format!(
            "Unsupported file type. Allowed: {}",
            state.config.omr_extensions.join(", ")
        )));
    }

    let (job_id, upload_path) = state.staging.save_upload(&bytes, &filename)?;
    state
        .registry
        .create_with_id(job_id, PipelineKind::Omr, &filename, upload_path.clone());

    spawn_pipeline_run(state, job_id, upload_path, instrument);

    Ok(Json(UploadResponse {
        job_id,
        status: "uploaded",
        message: "File uploaded successfully. Processing started.",
    }))
}

/// Fire-and-forget background run; the permit bounds how many pipelines
/// execute at once, excess jobs queue at `uploaded`
fn spawn_pipeline_run(
    state: AppState,
    job_id: Uuid,
    upload_path: PathBuf,
    instrument: Instrument,
) {
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
            .score_to_audio
            .process(&upload_path, job_id, &on_status, instrument)
            .await
        {
            Ok(output) => {
                registry.mark_completed(job_id, output);
                tracing::info!(job_id = %job_id, "score-to-audio job completed");
            }
            Err(err) => {
                registry.mark_failed(job_id, err.to_string());
                tracing::error!(job_id = %job_id, error = %err, "score-to-audio job failed");
            }
        }
    });
}

/// GET /api/omr/status/{job_id}
async fn status(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> ApiResult<Json<Job>> {
    state
        .registry
        .get(job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {job_id}")))
}

/// GET /api/omr/download/{job_id}
///
/// Serves the synthesized MP3 once the job is completed.
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
        (header::CONTENT_TYPE, "audio/mpeg".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{stem}.mp3\""),
        ),
    ];
    Ok((headers, bytes).into_response())
}
