//! Pipeline orchestration
//!
//! Two fixed stage sequences share the same shape: run the stages in
//! order, fire the status callback with a progress milestone after each
//! successful stage, clean up intermediate artifacts, and report exactly
//! one `failed` update when a stage errors. The callback is a status
//! report, not a commit; the caller marks the job terminally
//! completed/failed through the registry.

pub mod audio_to_score;
pub mod score_to_audio;

pub use audio_to_score::AudioToScorePipeline;
pub use score_to_audio::ScoreToAudioPipeline;

use crate::models::JobUpdate;
use crate::stages::{StageContext, StageError, StageProcessor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

/// Status-update callback; pipelines know nothing about the registry
/// behind it
pub type StatusCallback = Arc<dyn Fn(Uuid, JobUpdate) + Send + Sync>;

/// A stage failure, tagged with the step that raised it
#[derive(Debug, Error)]
#[error("{step} stage failed: {source}")]
pub struct PipelineError {
    pub step: &'static str,
    #[source]
    pub source: StageError,
}

/// Run one stage and report its milestone on success or a single `failed`
/// update on error. No later stage runs after a failure.
pub(crate) async fn run_stage(
    stage: &dyn StageProcessor,
    input: &Path,
    ctx: &StageContext,
    job_id: Uuid,
    on_status: &StatusCallback,
    milestone: u8,
) -> Result<PathBuf, PipelineError> {
    info!(job_id = %job_id, stage = stage.name(), input = %input.display(), "running stage");
    match stage.process(input, ctx).await {
        Ok(output) => {
            info!(job_id = %job_id, stage = stage.name(), output = %output.display(), "stage complete");
            on_status(job_id, JobUpdate::processing(stage.name(), milestone));
            Ok(output)
        }
        Err(source) => {
            let err = PipelineError {
                step: stage.name(),
                source,
            };
            error!(job_id = %job_id, stage = stage.name(), error = %err, "stage failed");
            on_status(job_id, JobUpdate::failed(err.to_string()));
            Err(err)
        }
    }
}
