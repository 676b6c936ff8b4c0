//! Seams to the opaque speech engines.
//!
//! The models themselves live outside this crate. A loader builds an engine
//! from [`Settings`]; the registry decides when to call it.

mod params;

pub use params::{SynthesisParams, CALM_EMOTION_VECTOR};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::Result;

/// One synthesis invocation
#[derive(Debug, Clone, Copy)]
pub struct SynthesisJob<'a> {
    pub voice_path: &'a Path,
    pub text: &'a str,
    pub output_path: &'a Path,
    pub params: &'a SynthesisParams,
}

/// A loaded text-to-speech model. Writes a WAV file to `job.output_path`.
pub trait SynthesisEngine: Send + Sync {
    fn infer(&self, job: &SynthesisJob<'_>) -> Result<()>;
}

/// Recognition output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// A loaded speech-to-text model
pub trait RecognitionEngine: Send + Sync {
    fn transcribe(&self, audio_path: &Path, language: Option<&str>) -> Result<Transcript>;
}

/// Builds a synthesis engine. Expected to be slow.
pub trait SynthesisLoader: Send + Sync + 'static {
    fn load(&self, settings: &Settings) -> Result<Arc<dyn SynthesisEngine>>;
}

/// Builds a recognition engine for `settings.whisper_model_name`.
pub trait RecognitionLoader: Send + Sync + 'static {
    fn load(&self, settings: &Settings) -> Result<Arc<dyn RecognitionEngine>>;
}
