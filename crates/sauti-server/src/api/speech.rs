//! Text-to-speech endpoint

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use sauti_core::{Settings, SpeechService};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// TTS request
#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: String,
    /// Voice id; the first voice is used when absent
    #[serde(default)]
    pub voice: Option<String>,
}

/// Synthesize speech and return it as a WAV attachment
pub async fn tts(
    State(state): State<AppState>,
    Json(req): Json<SpeechRequest>,
) -> Result<Response, ApiError> {
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("text is required"));
    }

    info!(
        "TTS request: {} chars, voice: {}",
        text.chars().count(),
        req.voice.as_deref().unwrap_or("<default>")
    );

    let settings = &state.settings;
    if state.service.list_voices(settings).is_empty() {
        return Err(ApiError::not_found(
            "No voice files found. Please add .wav files to the voices/ directory.",
        ));
    }

    let voice_path = state.service.resolve_voice(req.voice.as_deref(), settings)?;
    let output_path = state
        .output_dir
        .join(format!("{}.wav", Uuid::new_v4().simple()));

    // Detached so the output is removed even if the client goes away mid-synthesis
    let task = tokio::spawn(render(
        state.service.clone(),
        state.settings.clone(),
        text.to_string(),
        voice_path,
        output_path,
    ));
    let audio = task
        .await
        .map_err(|e| ApiError::internal(format!("TTS task failed: {}", e)))??;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"tts.wav\""),
        ],
        Bytes::from(audio),
    )
        .into_response())
}

async fn render(
    service: Arc<SpeechService>,
    settings: Arc<Settings>,
    text: String,
    voice_path: PathBuf,
    output_path: PathBuf,
) -> Result<Vec<u8>, ApiError> {
    service
        .synthesize(&text, &voice_path, &output_path, &settings)
        .await?;

    let audio = tokio::fs::read(&output_path).await;
    if let Err(e) = tokio::fs::remove_file(&output_path).await {
        warn!("Failed to remove {:?}: {}", output_path, e);
    }
    audio.map_err(|e| ApiError::internal(format!("Failed to read audio: {}", e)))
}
