//! Application state management

use sauti_core::{Settings, SpeechService};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SpeechService>,
    pub settings: Arc<Settings>,
    /// Scratch directory for synthesized files before they are sent
    pub output_dir: PathBuf,
}

impl AppState {
    pub fn new(service: SpeechService, settings: Settings) -> Self {
        Self::with_output_dir(service, settings, std::env::temp_dir().join("sauti_tts"))
    }

    pub fn with_output_dir(
        service: SpeechService,
        settings: Settings,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service: Arc::new(service),
            settings: Arc::new(settings),
            output_dir: output_dir.into(),
        }
    }
}
