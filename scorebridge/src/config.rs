//! Service configuration
//!
//! Defaults carry the tuned constants for every external tool. A TOML file
//! can override any of them; the server-level knobs (port, data dir) can
//! additionally be overridden per-invocation via CLI flags or environment
//! variables, with priority CLI > env > TOML > default.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,

    /// Root data directory; uploads and outputs live underneath it
    pub data_dir: PathBuf,

    /// Maximum accepted upload size, enforced as the HTTP body limit
    pub max_upload_size_mb: usize,

    /// Accepted extensions for the score-to-audio pipeline (with dots)
    pub omr_extensions: Vec<String>,

    /// Accepted extensions for the audio-to-score pipeline (with dots)
    pub amt_extensions: Vec<String>,

    /// Delete intermediate artifacts after a pipeline completes
    pub cleanup_files: bool,

    /// Maximum number of pipeline runs executing at once; excess jobs
    /// queue at `uploaded` until a slot frees
    pub max_concurrent_jobs: usize,

    /// Timeout for the long-running recognition/transcription model runs
    pub tool_timeout_seconds: u64,

    /// General MIDI soundfont used by FluidSynth
    pub soundfont: PathBuf,

    /// Synthesis sample rate in Hz
    pub sample_rate: u32,

    /// Tempo inserted when a recognized score carries no metronome mark
    pub music21_tempo_bpm: u32,

    // Basic Pitch transcription thresholds
    pub basic_pitch_onset_threshold: f64,
    pub basic_pitch_frame_threshold: f64,
    /// Minimum note length in milliseconds
    pub basic_pitch_minimum_note_length: u32,
    /// C2, the lowest note on cello/bass
    pub basic_pitch_minimum_frequency: f64,
    /// C7, a very high piano note
    pub basic_pitch_maximum_frequency: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8350,
            data_dir: PathBuf::from("./data"),
            max_upload_size_mb: 100,
            omr_extensions: [".png", ".jpg", ".jpeg", ".pdf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            amt_extensions: [".mp3", ".wav", ".ogg", ".m4a"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cleanup_files: true,
            max_concurrent_jobs: 4,
            tool_timeout_seconds: 300,
            soundfont: PathBuf::from("/usr/share/sounds/sf2/FluidR3_GM.sf2"),
            sample_rate: 44100,
            music21_tempo_bpm: 120,
            basic_pitch_onset_threshold: 0.5,
            basic_pitch_frame_threshold: 0.3,
            basic_pitch_minimum_note_length: 127,
            basic_pitch_minimum_frequency: 65.41,
            basic_pitch_maximum_frequency: 2093.0,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file.
    ///
    /// A missing file is not an error (defaults apply); a present but
    /// invalid file aborts startup.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                let config = toml::from_str(&text)
                    .with_context(|| format!("invalid config file {}", path.display()))?;
                Ok(config)
            }
            Some(path) => {
                tracing::info!(
                    path = %path.display(),
                    "config file not found, using defaults"
                );
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Directory holding staged uploads
    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Directory holding intermediate and final output artifacts
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("outputs")
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.max_upload_size_mb * 1024 * 1024
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = Config::default();
        assert_eq!(config.port, 8350);
        assert_eq!(config.max_upload_size_mb, 100);
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.tool_timeout_seconds, 300);
        assert_eq!(config.sample_rate, 44100);
        assert!(config.cleanup_files);
        assert!(config.omr_extensions.contains(&".pdf".to_string()));
        assert!(config.amt_extensions.contains(&".wav".to_string()));
    }

    #[test]
    fn toml_overrides_apply_over_defaults() {
        let config: Config = toml::from_str(
            r#"
            port = 9000
            cleanup_files = false
            max_concurrent_jobs = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert!(!config.cleanup_files);
        assert_eq!(config.max_concurrent_jobs, 2);
        // Untouched fields keep their defaults
        assert_eq!(config.sample_rate, 44100);
    }

    #[test]
    fn derived_directories_hang_off_data_dir() {
        let config = Config {
            data_dir: PathBuf::from("/tmp/sb"),
            ..Config::default()
        };
        assert_eq!(config.upload_dir(), PathBuf::from("/tmp/sb/uploads"));
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/sb/outputs"));
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/scorebridge.toml"))).unwrap();
        assert_eq!(config.port, 8350);
    }
}
