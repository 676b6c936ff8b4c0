//! Error types for the Sauti speech core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration unavailable: {0}")]
    ConfigurationUnavailable(String),

    #[error("{0}")]
    VoiceNotFound(String),

    #[error("Engine unavailable: {0}")]
    EngineConstructionFailed(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Invalid audio payload: {0}")]
    DecodeFailed(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::ConfigurationUnavailable(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::DecodeFailed(e.to_string())
    }
}
