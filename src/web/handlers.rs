//! HTTP request handlers.

use super::AppState;
use crate::catalog::Endpoint;
use crate::probe::ProbeConfig;
use crate::session::{EngineError, HistoryEntry, SessionPolicy};

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

fn reject(e: EngineError) -> Response {
    let status = match e {
        EngineError::AlreadyRunning | EngineError::NotRunning => StatusCode::CONFLICT,
        EngineError::NoEndpointSelected | EngineError::InvalidPolicy(_) => StatusCode::BAD_REQUEST,
        EngineError::UnknownEndpoint(_) => StatusCode::NOT_FOUND,
    };
    (status, e.to_string()).into_response()
}

// ============================================================================
// API: Endpoints
// ============================================================================

#[derive(Debug, Serialize)]
pub struct EndpointsResponse {
    pub endpoints: Vec<Endpoint>,
    pub selected: Option<String>,
}

pub async fn handle_get_endpoints(State(state): State<AppState>) -> impl IntoResponse {
    Json(EndpointsResponse {
        endpoints: state.engine.catalog().entries().to_vec(),
        selected: state.engine.selected_endpoint().map(|e| e.id),
    })
}

#[derive(Debug, Deserialize)]
pub struct SelectEndpointRequest {
    pub id: String,
}

pub async fn handle_select_endpoint(
    State(state): State<AppState>,
    Json(req): Json<SelectEndpointRequest>,
) -> impl IntoResponse {
    match state.engine.select_endpoint(&req.id) {
        Ok(endpoint) => Json(endpoint).into_response(),
        Err(e) => reject(e),
    }
}

/// Re-probe the whole catalog and select the fastest responder.
pub async fn handle_select_nearest(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.auto_select().await)
}

// ============================================================================
// API: Probe config and policy
// ============================================================================

pub async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.probe_config())
}

pub async fn handle_set_config(
    State(state): State<AppState>,
    Json(config): Json<ProbeConfig>,
) -> impl IntoResponse {
    state.engine.set_probe_config(config);
    Json(config)
}

pub async fn handle_get_policy(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.policy())
}

pub async fn handle_set_policy(
    State(state): State<AppState>,
    Json(policy): Json<SessionPolicy>,
) -> impl IntoResponse {
    match state.engine.set_policy(policy) {
        Ok(()) => Json(policy).into_response(),
        Err(e) => reject(e),
    }
}

// ============================================================================
// API: Session control
// ============================================================================

pub async fn handle_start(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.start() {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => reject(e),
    }
}

pub async fn handle_stop(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.request_stop() {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => reject(e),
    }
}

pub async fn handle_live(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.live())
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_count: usize,
    pub entries: Vec<HistoryEntry>,
}

pub async fn handle_history(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.engine.history();
    Json(HistoryResponse {
        session_count: entries.len(),
        entries,
    })
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_favicon() -> impl IntoResponse {
    // Return a simple SVG favicon
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <circle cx="50" cy="50" r="45" fill="#2d9d78"/>
        <path d="M15 55 H35 L45 30 L55 75 L65 55 H85" stroke="white" stroke-width="5" fill="none"/>
    </svg>"##;

    (
        [(axum::http::header::CONTENT_TYPE, "image/svg+xml")],
        svg
    )
}
