//! Speech-to-text endpoint

use axum::{extract::State, Json};
use sauti_core::AudioPayload;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// STT request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SttRequest {
    /// Base64 audio, bare or as a data URL
    #[serde(default)]
    pub audio_base64: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// STT response
#[derive(Debug, Serialize, Deserialize)]
pub struct SttResponse {
    pub text: String,
}

/// Transcribe base64 audio
pub async fn transcribe(
    State(state): State<AppState>,
    Json(req): Json<SttRequest>,
) -> Result<Json<SttResponse>, ApiError> {
    let audio = req.audio_base64.trim();
    if audio.is_empty() {
        return Err(ApiError::bad_request("audioBase64 is required"));
    }
    if req.mime_type.trim().is_empty() {
        return Err(ApiError::bad_request("mimeType is required"));
    }

    info!(
        "STT request: {} base64 chars, mime: {}, language: {}",
        audio.len(),
        req.mime_type,
        req.language.as_deref().unwrap_or("auto")
    );

    let payload = AudioPayload::new(audio, req.mime_type.as_str());
    let text = state
        .service
        .transcribe_payload(&payload, req.language.as_deref(), &state.settings)
        .await?;

    Ok(Json(SttResponse { text }))
}
