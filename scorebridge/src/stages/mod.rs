//! Stage processors
//!
//! Each stage wraps one external conversion tool behind the
//! [`StageProcessor`] capability so pipelines (and tests) never care which
//! binary sits underneath. A stage validates its input, invokes the tool
//! with a fixed parameter set, and returns a deterministically named
//! artifact in the outputs directory.
//!
//! Stages never fabricate placeholder output: when a tool is missing or
//! rejects its input the stage fails with a typed, actionable error and
//! the job lands in `failed`.

pub mod conversion;
pub mod omr;
pub mod rendering;
pub mod synthesis;
pub mod transcription;

pub use conversion::ConversionStage;
pub use omr::OmrStage;
pub use rendering::RenderingStage;
pub use synthesis::SynthesisStage;
pub use transcription::TranscriptionStage;

use crate::config::Config;
use crate::models::Instrument;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Per-job context handed to every stage; only synthesis reads the
/// instrument selection
#[derive(Debug, Clone, Default)]
pub struct StageContext {
    pub instrument: Instrument,
}

/// One external-tool-backed transformation step
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// Step label recorded in job status updates
    fn name(&self) -> &'static str;

    /// Transform `input` into a new artifact in the outputs directory,
    /// named `{input stem}{stage suffix}`
    async fn process(&self, input: &Path, ctx: &StageContext) -> Result<PathBuf, StageError>;

    /// Best-effort delete of an intermediate artifact; honors the global
    /// cleanup toggle and never fails
    fn cleanup(&self, artifact: &Path);
}

/// Typed failure taxonomy for stage processing
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{tool} is not installed or not on PATH. {hint}")]
    ToolNotFound { tool: &'static str, hint: String },

    #[error("{tool} rejected the input: {message}")]
    InputRejected { tool: &'static str, message: String },

    #[error("unsupported file format: {extension} (expected one of {allowed})")]
    UnsupportedFormat { extension: String, allowed: String },

    #[error("{tool} failed (exit code {code:?}): {stderr}")]
    ToolFailed {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: &'static str, seconds: u64 },

    #[error("input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("{tool} did not produce the expected output: {}", path.display())]
    MissingOutput { tool: &'static str, path: PathBuf },

    #[error("MIDI rewrite failed: {0}")]
    Midi(#[from] crate::midi::MidiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run an external tool, capturing stdout/stderr, killing it on timeout.
pub(crate) async fn run_tool(
    tool: &'static str,
    hint: &str,
    cmd: &mut Command,
    timeout: Duration,
) -> Result<Output, StageError> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    tracing::debug!(tool, "running external tool");

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(StageError::ToolNotFound {
                tool,
                hint: hint.to_string(),
            })
        }
        Ok(Err(err)) => return Err(StageError::Io(err)),
        Err(_) => {
            return Err(StageError::Timeout {
                tool,
                seconds: timeout.as_secs(),
            })
        }
    };

    if !output.stdout.is_empty() {
        tracing::debug!(tool, stdout = %String::from_utf8_lossy(&output.stdout), "tool stdout");
    }
    if !output.stderr.is_empty() {
        tracing::debug!(tool, stderr = %String::from_utf8_lossy(&output.stderr), "tool stderr");
    }

    Ok(output)
}

/// Map a non-zero exit into a `ToolFailed` error carrying the diagnostic
pub(crate) fn ensure_success(tool: &'static str, output: &Output) -> Result<(), StageError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(StageError::ToolFailed {
            tool,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

pub(crate) fn ensure_input_exists(input: &Path) -> Result<(), StageError> {
    if input.exists() {
        Ok(())
    } else {
        Err(StageError::MissingInput(input.to_path_buf()))
    }
}

/// Extension allow-list check at the stage boundary. Uploads are validated
/// at the API edge, but entry stages reject unsupported inputs on their own
/// so the tool is never handed a file it cannot read.
pub(crate) fn ensure_allowed_extension(
    input: &Path,
    allowed: &[String],
) -> Result<(), StageError> {
    let extension = input
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
        Ok(())
    } else {
        Err(StageError::UnsupportedFormat {
            extension,
            allowed: allowed.join(", "),
        })
    }
}

/// Best-effort removal of an intermediate artifact under the cleanup toggle
pub(crate) fn discard_artifact(config: &Config, artifact: &Path) {
    if !config.cleanup_files {
        return;
    }
    if artifact.exists() {
        match std::fs::remove_file(artifact) {
            Ok(()) => tracing::debug!(path = %artifact.display(), "removed intermediate artifact"),
            Err(err) => tracing::warn!(
                path = %artifact.display(),
                error = %err,
                "failed to remove intermediate artifact"
            ),
        }
    }
}

/// Input base name without its extension
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}
