//! Whisper transcription through the Python daemon

use serde::Serialize;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::daemon::PythonDaemon;
use crate::config::Settings;
use crate::engine::{RecognitionEngine, RecognitionLoader, Transcript};
use crate::error::{Error, Result};

const ENGINE_NAME: &str = "whisper";

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    command: &'static str,
    audio_path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

/// Spawns a whisper daemon for `settings.whisper_model_name`
#[derive(Debug, Default, Clone, Copy)]
pub struct WhisperLoader;

impl WhisperLoader {
    fn daemon_args(settings: &Settings) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--model-name".into(),
            settings.whisper_model_name.clone().into(),
            "--download-root".into(),
            settings.whisper_model_dir.clone().into(),
        ];
        if let Some(device) = settings.device() {
            args.push("--device".into());
            args.push(device.into());
        }
        args
    }
}

impl RecognitionLoader for WhisperLoader {
    fn load(&self, settings: &Settings) -> Result<Arc<dyn RecognitionEngine>> {
        let daemon = PythonDaemon::spawn(settings, ENGINE_NAME, Self::daemon_args(settings))?;
        Ok(Arc::new(WhisperEngine::new(daemon)))
    }
}

pub struct WhisperEngine {
    daemon: PythonDaemon,
}

impl WhisperEngine {
    pub fn new(daemon: PythonDaemon) -> Self {
        Self { daemon }
    }
}

impl RecognitionEngine for WhisperEngine {
    fn transcribe(&self, audio_path: &Path, language: Option<&str>) -> Result<Transcript> {
        debug!("Whisper request: {:?} (language: {:?})", audio_path, language);

        let request = TranscribeRequest {
            command: "transcribe",
            audio_path,
            language,
        };
        let response = self.daemon.call(&request, Error::TranscriptionFailed)?;

        Ok(Transcript {
            text: response.text.unwrap_or_default(),
            language: response.language,
        })
    }
}
