//! Audio transcription stage
//!
//! Wraps the Basic Pitch CLI: monophonic-or-better audio in, Standard
//! MIDI File out. The tool writes `{stem}_basic_pitch.mid`; the stage
//! renames it to the deterministic `{stem}.mid` the pipeline contract
//! promises.

use super::{
    discard_artifact, ensure_allowed_extension, ensure_input_exists, ensure_success, file_stem,
    run_tool, StageContext, StageError, StageProcessor,
};
use crate::config::Config;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

const BASIC_PITCH_HINT: &str = "Install it with `pip install basic-pitch`.";

pub struct TranscriptionStage {
    config: Arc<Config>,
}

impl TranscriptionStage {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StageProcessor for TranscriptionStage {
    fn name(&self) -> &'static str {
        "transcription"
    }

    async fn process(&self, input: &Path, _ctx: &StageContext) -> Result<PathBuf, StageError> {
        ensure_input_exists(input)?;
        ensure_allowed_extension(input, &self.config.amt_extensions)?;

        let stem = file_stem(input);
        let output_dir = self.config.output_dir();

        info!(input = %input.display(), "transcribing audio to MIDI");
        let mut cmd = Command::new("basic-pitch");
        cmd.arg(&output_dir)
            .arg(input)
            .arg("--save-midi")
            .arg("--onset-threshold")
            .arg(self.config.basic_pitch_onset_threshold.to_string())
            .arg("--frame-threshold")
            .arg(self.config.basic_pitch_frame_threshold.to_string())
            .arg("--minimum-note-length")
            .arg(self.config.basic_pitch_minimum_note_length.to_string())
            .arg("--minimum-frequency")
            .arg(self.config.basic_pitch_minimum_frequency.to_string())
            .arg("--maximum-frequency")
            .arg(self.config.basic_pitch_maximum_frequency.to_string());
        let output = run_tool(
            "basic-pitch",
            BASIC_PITCH_HINT,
            &mut cmd,
            self.config.tool_timeout(),
        )
        .await?;
        ensure_success("basic-pitch", &output)?;

        // basic-pitch names its output after the input with a fixed suffix
        let tool_output = output_dir.join(format!("{stem}_basic_pitch.mid"));
        let midi_path = output_dir.join(format!("{stem}.mid"));
        if tool_output.exists() {
            std::fs::rename(&tool_output, &midi_path)?;
        }
        if !midi_path.exists() {
            return Err(StageError::MissingOutput {
                tool: "basic-pitch",
                path: midi_path,
            });
        }

        info!(output = %midi_path.display(), "transcription complete");
        Ok(midi_path)
    }

    fn cleanup(&self, artifact: &Path) {
        discard_artifact(&self.config, artifact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_audio_input_is_rejected_before_any_tool_runs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("score.png");
        std::fs::write(&input, b"pixels").unwrap();

        let stage = TranscriptionStage::new(Arc::new(Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        }));
        let err = stage
            .process(&input, &StageContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::UnsupportedFormat { .. }));
        assert!(err.to_string().contains(".png"));
    }
}
