//! HTTP API handlers for the chart feed.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::pipeline::{LoopState, SharedFrame, WindowBuffer};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Window the acquisition loop writes into
    pub buffer: Arc<WindowBuffer>,
    /// Latest frame published by the render loop
    pub frame: SharedFrame,
    /// Acquisition loop state
    pub loop_state: watch::Receiver<LoopState>,
    /// Name of the active sample source
    pub source: String,
}

impl ApiState {
    pub fn new(
        buffer: Arc<WindowBuffer>,
        frame: SharedFrame,
        loop_state: watch::Receiver<LoopState>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            buffer,
            frame,
            loop_state,
            source: source.into(),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" while the loop is alive, "down" once it terminated
    pub status: &'static str,
    pub loop_state: LoopState,
    pub source: String,
    pub sample_count: usize,
    pub window_secs: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/health
pub async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let loop_state = *state.loop_state.borrow();
    let status = if loop_state == LoopState::Terminated {
        "down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        loop_state,
        source: state.source.clone(),
        sample_count: state.buffer.len(),
        window_secs: state.buffer.window().as_secs_f64(),
        timestamp: Utc::now(),
    })
}

/// GET /api/v1/chart
///
/// 503 until the render loop has produced its first frame.
pub async fn get_chart(State(state): State<ApiState>) -> Response {
    match state.frame.latest() {
        Some(frame) => Json(frame).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "no frame rendered yet".to_string(),
            }),
        )
            .into_response(),
    }
}
