//! File staging
//!
//! Owns the two flat data directories. Uploads are stored as
//! `{job_id}{original extension}`; output artifacts are always named
//! `{input stem}{stage suffix}`, so collisions are impossible while job
//! IDs are unique.

use crate::config::Config;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FileStaging {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl FileStaging {
    pub fn new(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir(),
            output_dir: config.output_dir(),
        }
    }

    /// Create both data directories; called once at startup
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Case-insensitive extension allow-list check
    pub fn validate_extension(&self, filename: &str, allowed: &[String]) -> bool {
        match dotted_extension(filename) {
            Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)),
            None => false,
        }
    }

    /// Persist uploaded bytes, minting the job ID the upload is stored
    /// under. Returns the ID and the staged path.
    pub fn save_upload(
        &self,
        bytes: &[u8],
        original_filename: &str,
    ) -> std::io::Result<(Uuid, PathBuf)> {
        let job_id = Uuid::new_v4();
        let ext = dotted_extension(original_filename).unwrap_or_default();
        let upload_path = self.upload_dir.join(format!("{job_id}{ext}"));
        std::fs::write(&upload_path, bytes)?;
        info!(
            filename = original_filename,
            path = %upload_path.display(),
            "saved upload"
        );
        Ok((job_id, upload_path))
    }
}

/// Lowercased extension including the dot, e.g. `".png"`
fn dotted_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
}
