//! Sauti Core - speech engine lifecycle and admission control
//!
//! This crate owns the expensive parts of the Sauti speech service: the
//! text-to-speech and speech-to-text engines, the gate that bounds how many
//! synthesis calls run at once, and the catalog of reference voices.
//!
//! # Architecture
//!
//! - [`voices`]: voice ids resolved against a directory of `.wav` files
//! - [`registry::EngineRegistry`]: engines constructed once and memoized
//! - [`gate::SynthesisGate`]: per-configuration bounded concurrency
//! - [`service::SpeechService`]: the entry points composing the above
//! - [`bridge`]: engines hosted in a Python daemon
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sauti_core::{IndexTtsLoader, Settings, SpeechService, WhisperLoader};
//!
//! let settings = Settings::load()?;
//! let service = SpeechService::with_loaders(Arc::new(IndexTtsLoader), Arc::new(WhisperLoader));
//!
//! let voice = service.resolve_voice(None, &settings)?;
//! service.synthesize("Hello, world!", &voice, "out.wav".as_ref(), &settings).await?;
//! ```

pub mod audio;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod registry;
pub mod service;
pub mod voices;

#[cfg(test)]
mod testing;

pub use audio::AudioPayload;
pub use bridge::{IndexTtsLoader, WhisperLoader};
pub use config::Settings;
pub use engine::{
    RecognitionEngine, RecognitionLoader, SynthesisEngine, SynthesisJob, SynthesisLoader,
    SynthesisParams, Transcript,
};
pub use error::{Error, Result};
pub use gate::{SynthesisGate, SynthesisPermit};
pub use registry::{EngineRegistry, EngineStatus, SlotState};
pub use service::SpeechService;
pub use voices::Voice;
