//! scorebridge library interface
//!
//! Converts sheet-music images/PDFs to audio and audio to sheet-music
//! PDFs by chaining external conversion tools behind a job-tracking web
//! API. Exposed as a library so integration tests can drive the router
//! directly.

pub mod api;
pub mod config;
pub mod error;
pub mod midi;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod staging;
pub mod stages;

pub use crate::config::Config;
pub use crate::error::{ApiError, ApiResult};

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::pipeline::{AudioToScorePipeline, ScoreToAudioPipeline};
use crate::registry::JobRegistry;
use crate::staging::FileStaging;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Shared in-memory job table
    pub registry: JobRegistry,
    pub staging: Arc<FileStaging>,
    pub score_to_audio: Arc<ScoreToAudioPipeline>,
    pub audio_to_score: Arc<AudioToScorePipeline>,
    /// Bounds how many pipeline runs execute concurrently
    pub job_permits: Arc<Semaphore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let staging = Arc::new(FileStaging::new(&config));
        let score_to_audio = Arc::new(ScoreToAudioPipeline::new(config.clone()));
        let audio_to_score = Arc::new(AudioToScorePipeline::new(config.clone()));
        let job_permits = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            config,
            registry: JobRegistry::new(),
            staging,
            score_to_audio,
            audio_to_score,
            job_permits,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_size_bytes();

    Router::new()
        .merge(api::health::routes())
        .merge(api::jobs::routes())
        .nest("/api/omr", api::omr::routes())
        .nest("/api/amt", api::amt::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
