//! Audio synthesis stage
//!
//! MIDI plus an instrument selection in, MP3 out. The input MIDI is first
//! rewritten so every melodic channel plays the selected General MIDI
//! program, then FluidSynth renders it to WAV against the configured
//! soundfont, and ffmpeg encodes the WAV to MP3 at 192k.

use super::{
    discard_artifact, ensure_input_exists, ensure_success, file_stem, run_tool, StageContext,
    StageError, StageProcessor,
};
use crate::config::Config;
use crate::midi;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

const FLUIDSYNTH_HINT: &str = "Install the fluidsynth package.";
const FFMPEG_HINT: &str = "Install the ffmpeg package.";

pub struct SynthesisStage {
    config: Arc<Config>,
}

impl SynthesisStage {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StageProcessor for SynthesisStage {
    fn name(&self) -> &'static str {
        "synthesis"
    }

    async fn process(&self, input: &Path, ctx: &StageContext) -> Result<PathBuf, StageError> {
        ensure_input_exists(input)?;

        if !self.config.soundfont.exists() {
            return Err(StageError::ToolNotFound {
                tool: "soundfont",
                hint: format!(
                    "No General MIDI soundfont at {}. Install fluid-soundfont-gm or point \
                     `soundfont` in the config at one.",
                    self.config.soundfont.display()
                ),
            });
        }

        let stem = file_stem(input);
        let output_dir = self.config.output_dir();

        info!(
            input = %input.display(),
            instrument = %ctx.instrument,
            "synthesizing audio"
        );

        // Rewrite the MIDI with the selected instrument program
        let midi_bytes = std::fs::read(input)?;
        let rewritten = midi::set_program(&midi_bytes, ctx.instrument.program())?;
        let instrument_midi = output_dir.join(format!("{stem}_instrument.mid"));
        std::fs::write(&instrument_midi, rewritten)?;

        let wav_path = output_dir.join(format!("{stem}.wav"));
        let mut fluidsynth = Command::new("fluidsynth");
        fluidsynth
            .arg("-ni")
            .arg("-F")
            .arg(&wav_path)
            .args(["-T", "wav", "-O", "s16", "-r"])
            .arg(self.config.sample_rate.to_string())
            .arg(&self.config.soundfont)
            .arg(&instrument_midi);
        let output = run_tool(
            "fluidsynth",
            FLUIDSYNTH_HINT,
            &mut fluidsynth,
            Duration::from_secs(60),
        )
        .await?;
        ensure_success("fluidsynth", &output)?;
        if !wav_path.exists() {
            return Err(StageError::MissingOutput {
                tool: "fluidsynth",
                path: wav_path,
            });
        }

        let mp3_path = output_dir.join(format!("{stem}.mp3"));
        let mut ffmpeg = Command::new("ffmpeg");
        ffmpeg
            .arg("-y")
            .arg("-i")
            .arg(&wav_path)
            .args(["-codec:a", "libmp3lame", "-b:a", "192k"])
            .arg(&mp3_path);
        let output = run_tool("ffmpeg", FFMPEG_HINT, &mut ffmpeg, Duration::from_secs(60)).await?;
        ensure_success("ffmpeg", &output)?;
        if !mp3_path.exists() {
            return Err(StageError::MissingOutput {
                tool: "ffmpeg",
                path: mp3_path,
            });
        }

        // The instrument-rewritten MIDI is only ever an input to
        // fluidsynth; the WAV is kept when cleanup is disabled
        let _ = std::fs::remove_file(&instrument_midi);
        discard_artifact(&self.config, &wav_path);

        info!(output = %mp3_path.display(), instrument = %ctx.instrument, "audio synthesis complete");
        Ok(mp3_path)
    }

    fn cleanup(&self, artifact: &Path) {
        discard_artifact(&self.config, artifact);
    }
}
