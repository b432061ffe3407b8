//! HTTP API handlers

pub mod amt;
pub mod health;
pub mod jobs;
pub mod omr;

use serde::Serialize;
use uuid::Uuid;

/// Response to a successful upload on either pipeline
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
    pub status: &'static str,
    pub message: &'static str,
}
