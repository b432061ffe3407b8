//! Job record and status state machine
//!
//! A job progresses `uploaded → processing → {completed, failed}`.
//! Processing may repeat its own self-transition any number of times for
//! progress updates; terminal states never revert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Which conversion pipeline owns a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    /// Optical music recognition: image/PDF → audio
    Omr,
    /// Automatic music transcription: audio → score PDF
    Amt,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Omr => write!(f, "omr"),
            PipelineKind::Amt => write!(f, "amt"),
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Legal transitions of the status state machine.
    ///
    /// `uploaded → failed` is allowed because a pipeline can fail before
    /// its first progress callback. Terminal self-transitions are allowed
    /// so the completion merge can attach the output path.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Uploaded, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Completed)
                | (Failed, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Uploaded => write!(f, "uploaded"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One tracked end-to-end conversion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    #[serde(rename = "type")]
    pub kind: PipelineKind,
    pub status: JobStatus,
    /// Original upload filename, used for display and download naming
    pub filename: String,
    pub upload_path: PathBuf,
    /// Set if and only if the job completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Set if and only if the job failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Name of the stage currently running, absent when not processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// 0-100, monotonically non-decreasing while processing
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(job_id: Uuid, kind: PipelineKind, filename: &str, upload_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            kind,
            status: JobStatus::Uploaded,
            filename: filename.to_string(),
            upload_path,
            output_path: None,
            error: None,
            step: None,
            progress: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial-field payload merged into a job by the registry.
///
/// Pipelines report progress through these; only recognized fields are
/// merged and the registry enforces the state-machine invariants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub step: Option<String>,
    pub progress: Option<u8>,
    pub error: Option<String>,
    pub output_path: Option<PathBuf>,
}

impl JobUpdate {
    /// A progress milestone while a stage sequence is running
    pub fn processing(step: &str, progress: u8) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            step: Some(step.to_string()),
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn completed() -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            ..Self::default()
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_accept_only_self_transitions() {
        assert!(JobStatus::Completed.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Uploaded));
    }

    #[test]
    fn uploaded_may_fail_before_first_progress_callback() {
        assert!(JobStatus::Uploaded.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Uploaded.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Uploaded.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn job_serializes_with_wire_field_names() {
        let job = Job::new(
            Uuid::new_v4(),
            PipelineKind::Omr,
            "scale.png",
            PathBuf::from("/data/uploads/x.png"),
        );
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "omr");
        assert_eq!(value["status"], "uploaded");
        assert_eq!(value["progress"], 0);
        // Absent optional fields are omitted entirely
        assert!(value.get("output_path").is_none());
        assert!(value.get("error").is_none());
        assert!(value.get("step").is_none());
    }
}
