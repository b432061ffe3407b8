//! Notation-format conversion stage
//!
//! Converts MusicXML to a Standard MIDI File through music21, driven as a
//! `python3 -c` subprocess. The embedded script inserts a default
//! metronome mark when the score carries none, so synthesis always has a
//! tempo to work with.

use super::{
    discard_artifact, ensure_input_exists, file_stem, run_tool, StageContext, StageError,
    StageProcessor,
};
use crate::config::Config;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

const PYTHON_HINT: &str = "Install Python 3 and `pip install music21`.";
const MUSIC21_HINT: &str = "Install it with `pip install music21`.";

/// argv: input MusicXML, output MIDI, fallback tempo in BPM
const MUSIC21_SCRIPT: &str = r#"
import sys
from music21 import converter, tempo

score = converter.parse(sys.argv[1])
if not score.flatten().getElementsByClass(tempo.MetronomeMark):
    for part in score.parts:
        part.insert(0, tempo.MetronomeMark(number=int(sys.argv[3])))
score.write('midi', fp=sys.argv[2])
"#;

pub struct ConversionStage {
    config: Arc<Config>,
}

impl ConversionStage {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StageProcessor for ConversionStage {
    fn name(&self) -> &'static str {
        "conversion"
    }

    async fn process(&self, input: &Path, _ctx: &StageContext) -> Result<PathBuf, StageError> {
        ensure_input_exists(input)?;

        let output_path = self
            .config
            .output_dir()
            .join(format!("{}.mid", file_stem(input)));

        info!(input = %input.display(), "converting notation to MIDI");
        let mut cmd = Command::new("python3");
        cmd.arg("-c")
            .arg(MUSIC21_SCRIPT)
            .arg(input)
            .arg(&output_path)
            .arg(self.config.music21_tempo_bpm.to_string());
        let output = run_tool("python3", PYTHON_HINT, &mut cmd, Duration::from_secs(60)).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No module named 'music21'") {
                return Err(StageError::ToolNotFound {
                    tool: "music21",
                    hint: MUSIC21_HINT.to_string(),
                });
            }
            return Err(StageError::InputRejected {
                tool: "music21",
                message: stderr.trim().to_string(),
            });
        }

        if !output_path.exists() {
            return Err(StageError::MissingOutput {
                tool: "music21",
                path: output_path,
            });
        }
        Ok(output_path)
    }

    fn cleanup(&self, artifact: &Path) {
        discard_artifact(&self.config, artifact);
    }
}
