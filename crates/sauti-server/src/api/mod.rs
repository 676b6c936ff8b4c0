//! HTTP routes

mod health;
mod speech;
mod stt;
mod voices;

pub use speech::SpeechRequest;
pub use stt::{SttRequest, SttResponse};

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let voices_dir = state.settings.voices_dir.clone();
    let cors = cors_layer(&state.settings.cors_allow_origins);

    Router::new()
        .route("/api/speech/tts", post(speech::tts))
        .route("/api/voices", get(voices::list))
        .route("/stt", post(stt::transcribe))
        .route("/health", get(health::health))
        // Reference recordings for voice previews
        .nest_service("/voices", ServeDir::new(voices_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
