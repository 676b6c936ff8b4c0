//! Voice listing endpoint

use axum::{extract::State, Json};
use sauti_core::Voice;

use crate::state::AppState;

/// List the available voices
pub async fn list(State(state): State<AppState>) -> Json<Vec<Voice>> {
    Json(state.service.list_voices(&state.settings))
}
