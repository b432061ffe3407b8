//! Image/PDF → audio pipeline
//!
//! Fixed sequence: recognize notation → convert to MIDI → synthesize
//! audio with the selected instrument voice. Milestones: omr 25,
//! conversion 50, synthesis 75, then 100 on completion.

use super::{run_stage, PipelineError, StatusCallback};
use crate::config::Config;
use crate::models::{Instrument, JobUpdate};
use crate::stages::{
    ConversionStage, OmrStage, StageContext, StageProcessor, SynthesisStage,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct ScoreToAudioPipeline {
    omr: Arc<dyn StageProcessor>,
    conversion: Arc<dyn StageProcessor>,
    synthesis: Arc<dyn StageProcessor>,
}

impl ScoreToAudioPipeline {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            omr: Arc::new(OmrStage::new(config.clone())),
            conversion: Arc::new(ConversionStage::new(config.clone())),
            synthesis: Arc::new(SynthesisStage::new(config)),
        }
    }

    /// Substitute stage implementations; used by tests
    pub fn with_stages(
        omr: Arc<dyn StageProcessor>,
        conversion: Arc<dyn StageProcessor>,
        synthesis: Arc<dyn StageProcessor>,
    ) -> Self {
        Self {
            omr,
            conversion,
            synthesis,
        }
    }

    /// Run the full pipeline for one job, returning the final audio
    /// artifact path.
    pub async fn process(
        &self,
        input: &Path,
        job_id: Uuid,
        on_status: &StatusCallback,
        instrument: Instrument,
    ) -> Result<PathBuf, PipelineError> {
        let ctx = StageContext { instrument };
        info!(job_id = %job_id, input = %input.display(), instrument = %instrument, "starting score-to-audio pipeline");

        let notation = run_stage(self.omr.as_ref(), input, &ctx, job_id, on_status, 25).await?;
        let midi = run_stage(self.conversion.as_ref(), &notation, &ctx, job_id, on_status, 50).await?;
        let audio = run_stage(self.synthesis.as_ref(), &midi, &ctx, job_id, on_status, 75).await?;

        self.omr.cleanup(&notation);
        self.conversion.cleanup(&midi);
        on_status(job_id, JobUpdate::completed());

        info!(job_id = %job_id, output = %audio.display(), "score-to-audio pipeline complete");
        Ok(audio)
    }
}
