//! Service info and health endpoints

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route("/favicon.ico", get(favicon))
        .route("/api/health", get(health_check))
}

/// GET /
///
/// Service identity and endpoint map for humans poking at the API.
async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "scorebridge",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "omr": {
                "upload": "POST /api/omr/upload",
                "status": "GET /api/omr/status/{job_id}",
                "download": "GET /api/omr/download/{job_id}",
            },
            "amt": {
                "upload": "POST /api/amt/upload",
                "status": "GET /api/amt/status/{job_id}",
                "download": "GET /api/amt/download/{job_id}",
            },
            "jobs": "GET /api/jobs",
            "health": "GET /api/health",
        }
    }))
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /api/health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "scorebridge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}
