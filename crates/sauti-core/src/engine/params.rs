//! Decoding parameters handed to the synthesis engine on every call

use serde::{Deserialize, Serialize};

/// Eight-way emotion mix with everything on "calm"
pub const CALM_EMOTION_VECTOR: [f32; 8] = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];

/// Engine tuning constants. Not exposed to requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub emo_alpha: f32,
    pub emo_vector: Vec<f32>,
    pub use_emo_text: bool,
    pub use_random: bool,
    /// Silence inserted between text segments, in milliseconds
    pub interval_silence: u32,
    pub max_text_tokens_per_segment: u32,
    pub do_sample: bool,
    pub top_p: f32,
    pub top_k: u32,
    pub temperature: f32,
    pub num_beams: u32,
    pub repetition_penalty: f32,
    pub max_mel_tokens: u32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            emo_alpha: 1.0,
            emo_vector: CALM_EMOTION_VECTOR.to_vec(),
            use_emo_text: false,
            use_random: false,
            interval_silence: 200,
            max_text_tokens_per_segment: 120,
            do_sample: true,
            top_p: 0.8,
            top_k: 30,
            temperature: 0.8,
            num_beams: 3,
            repetition_penalty: 10.0,
            max_mel_tokens: 1500,
        }
    }
}
