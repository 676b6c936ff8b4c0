//! Incoming audio payloads for transcription
//!
//! Clients send base64 audio (optionally as a `data:` URL) together with a
//! MIME type. The recognition engine sniffs the container from the file
//! suffix, so the payload is written to a temp file named accordingly.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

/// Suffix for MIME types the table does not know
pub const DEFAULT_SUFFIX: &str = ".audio";

const MIME_SUFFIXES: &[(&str, &str)] = &[
    ("audio/webm", ".webm"),
    ("audio/ogg", ".ogg"),
    ("audio/wav", ".wav"),
    ("audio/x-wav", ".wav"),
    ("audio/mpeg", ".mp3"),
    ("audio/mp3", ".mp3"),
];

/// Accepts padded and unpadded input
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encoded audio as received from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPayload {
    /// Base64 data, bare or as a `data:` URL
    pub data: String,
    pub mime_type: String,
}

impl AudioPayload {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Temp file suffix for this payload's MIME type
    pub fn suffix(&self) -> &'static str {
        mime_to_suffix(&normalize_mime(&self.mime_type))
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        decode_base64(&self.data)
    }

    /// Decode into a temp file that is deleted on drop
    pub fn materialize(&self) -> Result<NamedTempFile> {
        let bytes = self.decode()?;
        let mut file = tempfile::Builder::new()
            .prefix("sauti-stt-")
            .suffix(self.suffix())
            .tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;

        debug!(
            "Wrote {} bytes of {} audio to {:?}",
            bytes.len(),
            self.mime_type,
            file.path()
        );
        Ok(file)
    }
}

/// `"Audio/WebM; codecs=opus"` -> `"audio/webm"`
pub fn normalize_mime(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

/// File suffix for a normalized MIME type
pub fn mime_to_suffix(mime: &str) -> &'static str {
    MIME_SUFFIXES
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, suffix)| *suffix)
        .unwrap_or(DEFAULT_SUFFIX)
}

/// Drop a `data:<mime>;base64,` prefix if present
pub fn strip_data_url(value: &str) -> &str {
    if value.starts_with("data:") {
        if let Some((_, data)) = value.split_once(',') {
            return data;
        }
    }
    value
}

/// Decode base64 audio, ignoring whitespace and an optional data URL prefix
pub fn decode_base64(value: &str) -> Result<Vec<u8>> {
    let compact: String = strip_data_url(value.trim())
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    LENIENT_BASE64
        .decode(compact.as_bytes())
        .map_err(|e| Error::DecodeFailed(format!("invalid audioBase64: {}", e)))
}
