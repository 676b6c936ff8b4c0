//! Health check

use axum::{extract::State, Json};
use sauti_core::EngineStatus;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub engines: EngineStatus,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        engines: state.service.registry().status(),
    })
}
