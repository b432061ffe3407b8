//! Optical music recognition stage
//!
//! Wraps the `oemer` recognition model: image/PDF in, MusicXML out. PDF
//! inputs are pre-transformed by rendering page 1 to a 300 DPI PNG with
//! `pdftoppm`; pages beyond the first are explicitly unsupported.

use super::{
    discard_artifact, ensure_allowed_extension, ensure_input_exists, ensure_success, file_stem,
    run_tool, StageContext, StageError, StageProcessor,
};
use crate::config::Config;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

const OEMER_HINT: &str = "Install it with `pip install oemer`.";
const PDFTOPPM_HINT: &str = "Install poppler-utils.";

/// Guidance attached when the recognizer finds no stafflines at all
const NO_STAFFLINES_GUIDANCE: &str = "No musical stafflines detected in the image. \
This could be due to:\n\
1. First page of PDF is a title/cover page without music notation\n\
2. Image is too blurry or low quality\n\
3. Sheet music is not clearly visible\n\
4. Image format/scan quality is poor\n\
5. Background is too noisy or has artifacts\n\n\
For multi-page PDFs: Try extracting just the page with music notation. \
The system currently processes only the first page.";

/// Generic guidance for other recognition failures
const RECOGNITION_GUIDANCE: &str = "This could be due to:\n\
1. Sheet music complexity or formatting issues\n\
2. Image quality problems (blurry, low resolution, poor contrast)\n\
3. Multiple pages or systems that are difficult to process\n\
4. Non-standard notation or layout\n\n\
Try:\n\
- Using a clearer, higher resolution scan (300+ DPI)\n\
- Cropping to a single page with simple 1-2 staff music\n\
- Ensuring good lighting and contrast in the image\n\
- Using single-instrument parts rather than full scores";

pub struct OmrStage {
    config: Arc<Config>,
}

impl OmrStage {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Render page 1 of a PDF to `{stem}_converted.png` at 300 DPI
    async fn pdf_first_page_to_image(&self, pdf: &Path) -> Result<PathBuf, StageError> {
        let stem = file_stem(pdf);
        let output_dir = self.config.output_dir();
        let prefix = output_dir.join(format!("{stem}_converted"));

        info!(pdf = %pdf.display(), "converting first PDF page to image");
        let mut cmd = Command::new("pdftoppm");
        cmd.args(["-png", "-r", "300", "-f", "1", "-l", "1"])
            .arg(pdf)
            .arg(&prefix);
        let output = run_tool("pdftoppm", PDFTOPPM_HINT, &mut cmd, Duration::from_secs(60)).await?;
        ensure_success("pdftoppm", &output)?;

        let target = output_dir.join(format!("{stem}_converted.png"));
        match locate_rendered_page(&output_dir, &stem) {
            Some(rendered) => {
                std::fs::rename(&rendered, &target)?;
                Ok(target)
            }
            None if target.exists() => Ok(target),
            None => Err(StageError::MissingOutput {
                tool: "pdftoppm",
                path: target,
            }),
        }
    }
}

/// pdftoppm pads the page number according to the page count, so probe
/// the suffix variants it may emit
fn locate_rendered_page(output_dir: &Path, stem: &str) -> Option<PathBuf> {
    ["-1", "-01", "-001"]
        .iter()
        .map(|suffix| output_dir.join(format!("{stem}_converted{suffix}.png")))
        .find(|candidate| candidate.exists())
}

#[async_trait]
impl StageProcessor for OmrStage {
    fn name(&self) -> &'static str {
        "omr"
    }

    async fn process(&self, input: &Path, _ctx: &StageContext) -> Result<PathBuf, StageError> {
        ensure_input_exists(input)?;
        ensure_allowed_extension(input, &self.config.omr_extensions)?;

        let is_pdf = input
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        let image = if is_pdf {
            self.pdf_first_page_to_image(input).await?
        } else {
            input.to_path_buf()
        };

        let output_dir = self.config.output_dir();
        let expected = output_dir.join(format!("{}.musicxml", file_stem(&image)));

        info!(image = %image.display(), "running optical music recognition");
        let mut cmd = Command::new("oemer");
        cmd.arg(&image).arg("--output-path").arg(&output_dir);
        let output = run_tool("oemer", OEMER_HINT, &mut cmd, self.config.tool_timeout()).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // An empty staffline detection surfaces as a max() over an
            // empty iterable inside the recognizer
            let message = if stderr.contains("max()") {
                NO_STAFFLINES_GUIDANCE.to_string()
            } else {
                format!("{}\n\n{}", stderr.trim(), RECOGNITION_GUIDANCE)
            };
            return Err(StageError::InputRejected {
                tool: "oemer",
                message,
            });
        }

        if !expected.exists() {
            return Err(StageError::MissingOutput {
                tool: "oemer",
                path: expected,
            });
        }
        Ok(expected)
    }

    fn cleanup(&self, artifact: &Path) {
        discard_artifact(&self.config, artifact);
    }
}
