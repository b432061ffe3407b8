//! Score rendering stage
//!
//! MIDI in, paginated PDF out, via LilyPond. `midi2ly` converts the MIDI
//! to LilyPond source, the stage injects fixed layout directives (letter
//! paper, zero indent, 180 mm line width, tightened system spacing, bar
//! numbers removed), and `lilypond` engraves the PDF. Rendering consumes
//! the MIDI directly rather than round-tripping through MusicXML, which
//! degrades layout.

use super::{
    discard_artifact, ensure_input_exists, ensure_success, file_stem, run_tool, StageContext,
    StageError, StageProcessor,
};
use crate::config::Config;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

const LILYPOND_HINT: &str = "Install LilyPond: https://lilypond.org/";
const MIDI2LY_HINT: &str = "Install LilyPond (midi2ly ships with it): https://lilypond.org/";

const LAYOUT_BLOCK: &str = r#"
\paper {
  #(set-paper-size "letter")
  indent = 0\mm
  line-width = 180\mm
  ragged-right = ##f
  ragged-last = ##f
  ragged-bottom = ##f
  system-system-spacing = #'((basic-distance . 12) (minimum-distance . 8) (padding . 1))
}

\layout {
  \context {
    \Score
    \remove "Bar_number_engraver"
  }
}

"#;

/// Insert the fixed layout directives before the first `\score` block,
/// appending them when the file has none
pub(crate) fn inject_layout(ly_source: &str) -> String {
    if ly_source.contains("\\score") {
        let mut block = String::with_capacity(LAYOUT_BLOCK.len() + 7);
        block.push_str(LAYOUT_BLOCK);
        block.push_str("\\score");
        ly_source.replacen("\\score", &block, 1)
    } else {
        format!("{ly_source}\n{LAYOUT_BLOCK}")
    }
}

pub struct RenderingStage {
    config: Arc<Config>,
}

impl RenderingStage {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StageProcessor for RenderingStage {
    fn name(&self) -> &'static str {
        "rendering"
    }

    async fn process(&self, input: &Path, _ctx: &StageContext) -> Result<PathBuf, StageError> {
        ensure_input_exists(input)?;

        let stem = file_stem(input);
        let output_dir = self.config.output_dir();
        let ly_path = output_dir.join(format!("{stem}.ly"));

        info!(input = %input.display(), "converting MIDI to LilyPond source");
        let mut midi2ly = Command::new("midi2ly");
        midi2ly
            .arg("--duration-quant=16")
            .arg("--key=0:0")
            .arg(format!("--output={}", ly_path.display()))
            .arg(input);
        let output = run_tool("midi2ly", MIDI2LY_HINT, &mut midi2ly, Duration::from_secs(30)).await?;
        ensure_success("midi2ly", &output)?;

        let ly_source = std::fs::read_to_string(&ly_path)?;
        std::fs::write(&ly_path, inject_layout(&ly_source))?;

        let pdf_path = output_dir.join(format!("{stem}.pdf"));
        info!(ly = %ly_path.display(), "engraving PDF");
        let mut lilypond = Command::new("lilypond");
        lilypond
            .arg("--pdf")
            .arg(format!("--output={stem}"))
            .arg(&ly_path)
            .current_dir(&output_dir);
        let output = run_tool("lilypond", LILYPOND_HINT, &mut lilypond, Duration::from_secs(60)).await?;

        // LilyPond writes warnings to stderr even on success; the PDF on
        // disk is the real success signal
        if !pdf_path.exists() {
            return Err(StageError::InputRejected {
                tool: "lilypond",
                message: format!(
                    "PDF was not created: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        discard_artifact(&self.config, &ly_path);
        for ext in ["ps", "log"] {
            discard_artifact(&self.config, &output_dir.join(format!("{stem}.{ext}")));
        }

        info!(output = %pdf_path.display(), "PDF rendering complete");
        Ok(pdf_path)
    }

    fn cleanup(&self, artifact: &Path) {
        discard_artifact(&self.config, artifact);
    }
}
