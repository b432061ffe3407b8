//! In-memory job registry
//!
//! The registry exclusively owns the ID → job mapping. Pipelines and the
//! transport layer reference jobs by ID and mutate through `update`, which
//! is the single choke point enforcing the status state machine and the
//! monotonic-progress invariant. Updates to the same job are serialized by
//! the table lock; no state survives a process restart.

use crate::models::{Job, JobStatus, JobUpdate, PipelineKind};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cheaply clonable handle over the shared job table
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a job with a fresh ID
    pub fn create(&self, kind: PipelineKind, filename: &str, upload_path: PathBuf) -> Job {
        self.create_with_id(Uuid::new_v4(), kind, filename, upload_path)
    }

    /// Create a job under a caller-supplied ID (file staging mints the ID
    /// so the upload path and the job share it)
    pub fn create_with_id(
        &self,
        job_id: Uuid,
        kind: PipelineKind,
        filename: &str,
        upload_path: PathBuf,
    ) -> Job {
        let job = Job::new(job_id, kind, filename, upload_path);
        self.jobs.write().unwrap().insert(job_id, job.clone());
        info!(job_id = %job_id, kind = %kind, filename, "created job");
        job
    }

    /// Snapshot of a job, or `None` for an unknown ID
    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.read().unwrap().get(&job_id).cloned()
    }

    /// Merge a partial update into a job.
    ///
    /// Illegal status transitions are ignored with a warning, so a
    /// terminal job reads identically forever. Progress regressions while
    /// processing are dropped. `error` only sticks on failed jobs and
    /// `output_path` only on completed jobs, keeping the set-iff-status
    /// invariants true at the one place jobs are mutated.
    pub fn update(&self, job_id: Uuid, update: JobUpdate) -> Option<Job> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&job_id)?;

        if let Some(next) = update.status {
            if !job.status.can_transition_to(next) {
                warn!(
                    job_id = %job_id,
                    from = %job.status,
                    to = %next,
                    "ignoring illegal status transition"
                );
                return Some(job.clone());
            }
            job.status = next;
        }

        if let Some(step) = update.step {
            job.step = Some(step);
        }
        if let Some(progress) = update.progress {
            if progress >= job.progress {
                job.progress = progress;
            } else {
                debug!(
                    job_id = %job_id,
                    current = job.progress,
                    requested = progress,
                    "ignoring progress regression"
                );
            }
        }

        match job.status {
            JobStatus::Failed => {
                if let Some(error) = update.error {
                    job.error = Some(error);
                }
                job.step = None;
            }
            JobStatus::Completed => {
                if let Some(output_path) = update.output_path {
                    job.output_path = Some(output_path);
                }
                job.progress = 100;
                job.step = None;
            }
            _ => {}
        }

        job.updated_at = Utc::now();
        debug!(job_id = %job_id, status = %job.status, progress = job.progress, "updated job");
        Some(job.clone())
    }

    pub fn mark_completed(&self, job_id: Uuid, output_path: PathBuf) -> Option<Job> {
        self.update(
            job_id,
            JobUpdate {
                status: Some(JobStatus::Completed),
                progress: Some(100),
                output_path: Some(output_path),
                ..JobUpdate::default()
            },
        )
    }

    pub fn mark_failed(&self, job_id: Uuid, error: String) -> Option<Job> {
        self.update(job_id, JobUpdate::failed(error))
    }

    /// Administrative removal; never called by the normal conversion flow
    pub fn delete(&self, job_id: Uuid) -> bool {
        let removed = self.jobs.write().unwrap().remove(&job_id).is_some();
        if removed {
            info!(job_id = %job_id, "deleted job");
        }
        removed
    }

    /// Administrative listing, optionally filtered by pipeline kind
    pub fn list(&self, kind: Option<PipelineKind>) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap();
        jobs.values()
            .filter(|job| kind.map_or(true, |k| job.kind == k))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_job() -> (JobRegistry, Uuid) {
        let registry = JobRegistry::new();
        let job = registry.create(
            PipelineKind::Omr,
            "scale.png",
            PathBuf::from("/data/uploads/scale.png"),
        );
        (registry, job.job_id)
    }

    #[test]
    fn created_jobs_start_uploaded_with_zero_progress() {
        let (registry, id) = registry_with_job();
        let job = registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Uploaded);
        assert_eq!(job.progress, 0);
        assert!(job.output_path.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn ids_are_unique() {
        let registry = JobRegistry::new();
        let a = registry.create(PipelineKind::Omr, "a.png", PathBuf::from("a"));
        let b = registry.create(PipelineKind::Amt, "b.wav", PathBuf::from("b"));
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(registry.list(None).len(), 2);
    }

    #[test]
    fn update_unknown_id_is_a_no_op() {
        let registry = JobRegistry::new();
        assert!(registry
            .update(Uuid::new_v4(), JobUpdate::processing("omr", 25))
            .is_none());
    }

    #[test]
    fn progress_never_regresses_while_processing() {
        let (registry, id) = registry_with_job();
        registry.update(id, JobUpdate::processing("omr", 50)).unwrap();
        let job = registry.update(id, JobUpdate::processing("conversion", 25)).unwrap();
        assert_eq!(job.progress, 50);
        assert_eq!(job.step.as_deref(), Some("conversion"));
    }

    #[test]
    fn completed_jobs_read_exactly_100_with_output_path() {
        let (registry, id) = registry_with_job();
        registry.update(id, JobUpdate::processing("omr", 75)).unwrap();
        let job = registry
            .mark_completed(id, PathBuf::from("/data/outputs/scale.mp3"))
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output_path, Some(PathBuf::from("/data/outputs/scale.mp3")));
        assert!(job.error.is_none());
        assert!(job.step.is_none());
    }

    #[test]
    fn failed_jobs_carry_an_error_and_no_output_path() {
        let (registry, id) = registry_with_job();
        registry.update(id, JobUpdate::processing("omr", 25)).unwrap();
        let job = registry.mark_failed(id, "no stafflines detected".into()).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("no stafflines detected"));
        assert!(job.output_path.is_none());
    }

    #[test]
    fn output_path_is_ignored_outside_completion() {
        let (registry, id) = registry_with_job();
        registry.update(id, JobUpdate::processing("omr", 25)).unwrap();
        let job = registry
            .update(
                id,
                JobUpdate {
                    status: Some(JobStatus::Failed),
                    error: Some("tool crashed".into()),
                    output_path: Some(PathBuf::from("/data/outputs/partial.mp3")),
                    ..JobUpdate::default()
                },
            )
            .unwrap();
        assert!(job.output_path.is_none());
    }

    #[test]
    fn terminal_jobs_are_immutable() {
        let (registry, id) = registry_with_job();
        registry.update(id, JobUpdate::processing("omr", 25)).unwrap();
        registry.mark_failed(id, "boom".into()).unwrap();

        let before = registry.get(id).unwrap();
        registry.update(id, JobUpdate::processing("synthesis", 75));
        registry.mark_completed(id, PathBuf::from("/data/outputs/late.mp3"));
        let after = registry.get(id).unwrap();

        assert_eq!(before, after);
        assert_eq!(after.status, JobStatus::Failed);
    }

    #[test]
    fn uploaded_job_may_fail_directly() {
        let (registry, id) = registry_with_job();
        let job = registry.mark_failed(id, "tool unavailable".into()).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn delete_and_list_by_kind() {
        let registry = JobRegistry::new();
        let omr = registry.create(PipelineKind::Omr, "a.png", PathBuf::from("a"));
        registry.create(PipelineKind::Amt, "b.wav", PathBuf::from("b"));

        assert_eq!(registry.list(Some(PipelineKind::Omr)).len(), 1);
        assert!(registry.delete(omr.job_id));
        assert!(!registry.delete(omr.job_id));
        assert!(registry.list(Some(PipelineKind::Omr)).is_empty());
        assert_eq!(registry.list(None).len(), 1);
    }
}
