//! Orchestrator tests with fake stage processors
//!
//! Substitute stages record every process/cleanup call so the milestone
//! sequence, artifact chaining, and failure behavior can be asserted
//! without any external tool installed.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use scorebridge::models::{Instrument, JobStatus, JobUpdate};
use scorebridge::pipeline::{AudioToScorePipeline, ScoreToAudioPipeline, StatusCallback};
use scorebridge::stages::{StageContext, StageError, StageProcessor};

/// Records every interaction and either returns a fixed artifact path or
/// fails with a synthetic rejection
struct FakeStage {
    name: &'static str,
    output: PathBuf,
    fail: bool,
    calls: Arc<Mutex<Vec<String>>>,
    seen_instrument: Arc<Mutex<Option<Instrument>>>,
}

impl FakeStage {
    fn new(name: &'static str, output: &str, calls: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            output: PathBuf::from(output),
            fail: false,
            calls: calls.clone(),
            seen_instrument: Arc::new(Mutex::new(None)),
        })
    }

    fn failing(name: &'static str, calls: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            output: PathBuf::new(),
            fail: true,
            calls: calls.clone(),
            seen_instrument: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl StageProcessor for FakeStage {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn process(&self, input: &Path, ctx: &StageContext) -> Result<PathBuf, StageError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("process:{}:{}", self.name, input.display()));
        *self.seen_instrument.lock().unwrap() = Some(ctx.instrument);
        if self.fail {
            return Err(StageError::InputRejected {
                tool: self.name,
                message: "synthetic failure".to_string(),
            });
        }
        Ok(self.output.clone())
    }

    fn cleanup(&self, artifact: &Path) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("cleanup:{}:{}", self.name, artifact.display()));
    }
}

/// Collects status updates delivered through the callback
fn recording_callback() -> (StatusCallback, Arc<Mutex<Vec<JobUpdate>>>) {
    let updates: Arc<Mutex<Vec<JobUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    let callback: StatusCallback = Arc::new(move |_job_id, update| {
        sink.lock().unwrap().push(update);
    });
    (callback, updates)
}

fn milestones(updates: &[JobUpdate]) -> Vec<(Option<JobStatus>, Option<String>, Option<u8>)> {
    updates
        .iter()
        .map(|u| (u.status, u.step.clone(), u.progress))
        .collect()
}

#[tokio::test]
async fn score_to_audio_reports_milestones_and_chains_artifacts() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let pipeline = ScoreToAudioPipeline::with_stages(
        FakeStage::new("omr", "/out/score.musicxml", &calls),
        FakeStage::new("conversion", "/out/score.mid", &calls),
        FakeStage::new("synthesis", "/out/score.mp3", &calls),
    );
    let (callback, updates) = recording_callback();

    let result = pipeline
        .process(
            Path::new("/uploads/score.png"),
            Uuid::new_v4(),
            &callback,
            Instrument::Piano,
        )
        .await
        .unwrap();
    assert_eq!(result, PathBuf::from("/out/score.mp3"));

    let updates = updates.lock().unwrap();
    assert_eq!(
        milestones(&updates),
        vec![
            (Some(JobStatus::Processing), Some("omr".into()), Some(25)),
            (Some(JobStatus::Processing), Some("conversion".into()), Some(50)),
            (Some(JobStatus::Processing), Some("synthesis".into()), Some(75)),
            (Some(JobStatus::Completed), None, Some(100)),
        ]
    );

    // Each stage consumed the previous stage's artifact, and the two
    // intermediates were cleaned up by their producing stages
    let calls = calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            "process:omr:/uploads/score.png".to_string(),
            "process:conversion:/out/score.musicxml".to_string(),
            "process:synthesis:/out/score.mid".to_string(),
            "cleanup:omr:/out/score.musicxml".to_string(),
            "cleanup:conversion:/out/score.mid".to_string(),
        ]
    );
}

#[tokio::test]
async fn audio_to_score_reports_two_stage_milestones() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let pipeline = AudioToScorePipeline::with_stages(
        FakeStage::new("transcription", "/out/clip.mid", &calls),
        FakeStage::new("rendering", "/out/clip.pdf", &calls),
    );
    let (callback, updates) = recording_callback();

    let result = pipeline
        .process(Path::new("/uploads/clip.wav"), Uuid::new_v4(), &callback)
        .await
        .unwrap();
    assert_eq!(result, PathBuf::from("/out/clip.pdf"));

    let updates = updates.lock().unwrap();
    assert_eq!(
        milestones(&updates),
        vec![
            (Some(JobStatus::Processing), Some("transcription".into()), Some(25)),
            (Some(JobStatus::Processing), Some("rendering".into()), Some(75)),
            (Some(JobStatus::Completed), None, Some(100)),
        ]
    );

    let calls = calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            "process:transcription:/uploads/clip.wav".to_string(),
            "process:rendering:/out/clip.mid".to_string(),
            "cleanup:transcription:/out/clip.mid".to_string(),
        ]
    );
}

#[tokio::test]
async fn synthesis_stage_receives_the_selected_instrument() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let synthesis = FakeStage::new("synthesis", "/out/score.mp3", &calls);
    let pipeline = ScoreToAudioPipeline::with_stages(
        FakeStage::new("omr", "/out/score.musicxml", &calls),
        FakeStage::new("conversion", "/out/score.mid", &calls),
        synthesis.clone(),
    );
    let (callback, _updates) = recording_callback();

    pipeline
        .process(
            Path::new("/uploads/score.png"),
            Uuid::new_v4(),
            &callback,
            Instrument::Trumpet,
        )
        .await
        .unwrap();

    assert_eq!(
        *synthesis.seen_instrument.lock().unwrap(),
        Some(Instrument::Trumpet)
    );
}

#[tokio::test]
async fn failure_at_any_position_stops_the_pipeline() {
    for failing_index in 0..3 {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let stage = |index: usize, name: &'static str, output: &str| -> Arc<dyn StageProcessor> {
            if index == failing_index {
                FakeStage::failing(name, &calls)
            } else {
                FakeStage::new(name, output, &calls)
            }
        };
        let pipeline = ScoreToAudioPipeline::with_stages(
            stage(0, "omr", "/out/score.musicxml"),
            stage(1, "conversion", "/out/score.mid"),
            stage(2, "synthesis", "/out/score.mp3"),
        );
        let (callback, updates) = recording_callback();

        let result = pipeline
            .process(
                Path::new("/uploads/score.png"),
                Uuid::new_v4(),
                &callback,
                Instrument::Piano,
            )
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("synthetic failure"));

        // No stage ran past the failing one, and nothing was cleaned up
        let calls = calls.lock().unwrap();
        let process_calls = calls.iter().filter(|c| c.starts_with("process:")).count();
        assert_eq!(process_calls, failing_index + 1);
        assert!(!calls.iter().any(|c| c.starts_with("cleanup:")));

        // Exactly one failed update, after the successful milestones
        let updates = updates.lock().unwrap();
        let failed: Vec<_> = updates
            .iter()
            .filter(|u| u.status == Some(JobStatus::Failed))
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error.as_deref().unwrap().contains("synthetic failure"));
        assert_eq!(updates.len(), failing_index + 1);
        assert_eq!(updates.last().unwrap().status, Some(JobStatus::Failed));
    }
}

#[tokio::test]
async fn rendering_failure_reports_the_rendering_step() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let pipeline = AudioToScorePipeline::with_stages(
        FakeStage::new("transcription", "/out/clip.mid", &calls),
        FakeStage::failing("rendering", &calls),
    );
    let (callback, updates) = recording_callback();

    let err = pipeline
        .process(Path::new("/uploads/clip.wav"), Uuid::new_v4(), &callback)
        .await
        .unwrap_err();
    assert_eq!(err.step, "rendering");

    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].progress, Some(25));
    assert_eq!(updates[1].status, Some(JobStatus::Failed));
}
