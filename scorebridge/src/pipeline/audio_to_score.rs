//! Audio → score-document pipeline
//!
//! Fixed sequence: transcribe audio to MIDI → render a paginated PDF
//! directly from the MIDI. Milestones: transcription 25, rendering 75,
//! then 100 on completion.

use super::{run_stage, PipelineError, StatusCallback};
use crate::config::Config;
use crate::models::JobUpdate;
use crate::stages::{RenderingStage, StageContext, StageProcessor, TranscriptionStage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct AudioToScorePipeline {
    transcription: Arc<dyn StageProcessor>,
    rendering: Arc<dyn StageProcessor>,
}

impl AudioToScorePipeline {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            transcription: Arc::new(TranscriptionStage::new(config.clone())),
            rendering: Arc::new(RenderingStage::new(config)),
        }
    }

    /// Substitute stage implementations; used by tests
    pub fn with_stages(
        transcription: Arc<dyn StageProcessor>,
        rendering: Arc<dyn StageProcessor>,
    ) -> Self {
        Self {
            transcription,
            rendering,
        }
    }

    /// Run the full pipeline for one job, returning the final PDF path.
    pub async fn process(
        &self,
        input: &Path,
        job_id: Uuid,
        on_status: &StatusCallback,
    ) -> Result<PathBuf, PipelineError> {
        let ctx = StageContext::default();
        info!(job_id = %job_id, input = %input.display(), "starting audio-to-score pipeline");

        let midi = run_stage(self.transcription.as_ref(), input, &ctx, job_id, on_status, 25).await?;
        let pdf = run_stage(self.rendering.as_ref(), &midi, &ctx, job_id, on_status, 75).await?;

        self.transcription.cleanup(&midi);
        on_status(job_id, JobUpdate::completed());

        info!(job_id = %job_id, output = %pdf.display(), "audio-to-score pipeline complete");
        Ok(pdf)
    }
}
