//! Speech service: the public entry points of the core
//!
//! Composes the voice catalog, the engine registry and the synthesis gate.
//! Engine calls run on the blocking pool. Everything a call must clean up
//! (its gate permit, a failed output file, a temp input file) moves into the
//! blocking task, so a caller that stops waiting does not free the permit
//! early or leave files behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::audio::AudioPayload;
use crate::config::Settings;
use crate::engine::{
    RecognitionEngine, RecognitionLoader, SynthesisJob, SynthesisLoader, SynthesisParams,
};
use crate::error::{Error, Result};
use crate::gate::SynthesisGate;
use crate::registry::EngineRegistry;
use crate::voices::{self, Voice};

pub struct SpeechService {
    registry: Arc<EngineRegistry>,
    gate: Arc<SynthesisGate>,
    params: SynthesisParams,
}

impl SpeechService {
    pub fn new(registry: Arc<EngineRegistry>, gate: Arc<SynthesisGate>) -> Self {
        Self {
            registry,
            gate,
            params: SynthesisParams::default(),
        }
    }

    /// Service with a fresh registry and gate around the given loaders
    pub fn with_loaders(
        synthesis: Arc<dyn SynthesisLoader>,
        recognition: Arc<dyn RecognitionLoader>,
    ) -> Self {
        Self::new(
            Arc::new(EngineRegistry::new(synthesis, recognition)),
            Arc::new(SynthesisGate::new()),
        )
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &SynthesisGate {
        &self.gate
    }

    pub fn list_voices(&self, settings: &Settings) -> Vec<Voice> {
        voices::list_voices(settings)
    }

    /// Resolve a voice id (or the default voice) to its reference file
    pub fn resolve_voice(&self, voice_id: Option<&str>, settings: &Settings) -> Result<PathBuf> {
        let voice_id = voice_id.filter(|id| !id.is_empty());
        voices::resolve_voice(voice_id, settings).ok_or_else(|| match voice_id {
            Some(id) => Error::VoiceNotFound(format!("voice not found: {}", id)),
            None => Error::VoiceNotFound("no voice files available".to_string()),
        })
    }

    /// Synthesize `text` in the voice of `voice_path` into `output_path`.
    ///
    /// Either a complete output file exists afterwards or none does.
    pub async fn synthesize(
        &self,
        text: &str,
        voice_path: &Path,
        output_path: &Path,
        settings: &Settings,
    ) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidRequest("text is required".to_string()));
        }
        if !voice_path.is_file() {
            return Err(Error::VoiceNotFound(format!(
                "voice file not found: {}",
                voice_path.display()
            )));
        }

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let engine = self.registry.synthesis_engine(settings).await?;
        let permit = self.gate.acquire(settings).await?;

        info!(
            "Synthesizing {} chars with voice {:?}",
            text.chars().count(),
            voice_path.file_stem().unwrap_or_default()
        );

        let text = text.to_string();
        let voice_path = voice_path.to_path_buf();
        let output = output_path.to_path_buf();
        let params = self.params.clone();

        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let started = Instant::now();
            let job = SynthesisJob {
                voice_path: &voice_path,
                text: &text,
                output_path: &output,
                params: &params,
            };

            let result = engine.infer(&job).and_then(|()| {
                if output.is_file() {
                    Ok(())
                } else {
                    Err(Error::SynthesisFailed(
                        "engine finished without writing output".to_string(),
                    ))
                }
            });

            match result {
                Ok(()) => {
                    debug!("Synthesis finished in {:?}", started.elapsed());
                    Ok(())
                }
                Err(e) => {
                    remove_output(&output);
                    Err(synthesis_failed(e))
                }
            }
        })
        .await;

        match result {
            Ok(result) => result,
            Err(e) => {
                remove_output(output_path);
                Err(Error::SynthesisFailed(format!("synthesis task failed: {}", e)))
            }
        }
    }

    /// Transcribe the audio file at `audio_path`. A blank `language`
    /// means auto-detect. Returns the trimmed text, possibly empty.
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        language: Option<&str>,
        settings: &Settings,
    ) -> Result<String> {
        let engine = self.registry.recognition_engine(settings).await?;
        recognize(engine, language, audio_path.to_path_buf()).await
    }

    /// Decode a client payload into a temp file and transcribe it. The temp
    /// file is removed once the engine is done with it.
    pub async fn transcribe_payload(
        &self,
        payload: &AudioPayload,
        language: Option<&str>,
        settings: &Settings,
    ) -> Result<String> {
        let file = payload.materialize()?;
        let engine = self.registry.recognition_engine(settings).await?;
        recognize(engine, language, file).await
    }
}

/// Run a transcription on the blocking pool. `input` is moved into the task
/// and dropped only after the engine returns.
async fn recognize<P>(
    engine: Arc<dyn RecognitionEngine>,
    language: Option<&str>,
    input: P,
) -> Result<String>
where
    P: AudioInput + Send + 'static,
{
    let language = language
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from);

    let transcript = tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let transcript = engine.transcribe(input.audio_path(), language.as_deref());
        debug!("Transcription finished in {:?}", started.elapsed());
        transcript
    })
    .await
    .map_err(|e| Error::TranscriptionFailed(format!("transcription task failed: {}", e)))?
    .map_err(transcription_failed)?;

    Ok(transcript.text.trim().to_string())
}

/// Something that owns or names an audio file on disk
trait AudioInput {
    fn audio_path(&self) -> &Path;
}

impl AudioInput for PathBuf {
    fn audio_path(&self) -> &Path {
        self
    }
}

impl AudioInput for tempfile::NamedTempFile {
    fn audio_path(&self) -> &Path {
        self.path()
    }
}

fn remove_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {:?}: {}", path, e),
    }
}

fn synthesis_failed(e: Error) -> Error {
    warn!("Synthesis failed: {}", e);
    match e {
        Error::SynthesisFailed(_) => e,
        other => Error::SynthesisFailed(other.to_string()),
    }
}

fn transcription_failed(e: Error) -> Error {
    warn!("Transcription failed: {}", e);
    match e {
        Error::TranscriptionFailed(_) => e,
        other => Error::TranscriptionFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubRecognitionLoader, StubSynthesis, StubSynthesisLoader};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        settings: Settings,
    }

    impl Fixture {
        fn new(voices: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            let voices_dir = dir.path().join("voices");
            std::fs::create_dir(&voices_dir).unwrap();
            for name in voices {
                std::fs::write(voices_dir.join(name), b"RIFF").unwrap();
            }
            let settings = Settings {
                voices_dir,
                checkpoints_dir: dir.path().join("checkpoints"),
                ..Default::default()
            };
            Self { dir, settings }
        }

        fn output(&self, name: &str) -> PathBuf {
            self.dir.path().join("out").join(name)
        }
    }

    fn service_with(engine: Arc<StubSynthesis>) -> (SpeechService, Arc<StubRecognitionLoader>) {
        let recognition = Arc::new(StubRecognitionLoader::new());
        let service = SpeechService::with_loaders(
            Arc::new(StubSynthesisLoader::with_engine(engine)),
            recognition.clone(),
        );
        (service, recognition)
    }

    #[tokio::test]
    async fn test_synthesize_default_voice_end_to_end() {
        let fixture = Fixture::new(&["alice.wav"]);
        let engine = Arc::new(StubSynthesis::new(b"RIFF\x01\x02\x03"));
        let (service, _) = service_with(engine.clone());
        let output = fixture.output("hello.wav");

        let voice = service.resolve_voice(None, &fixture.settings).unwrap();
        assert!(voice.ends_with("alice.wav"));

        service
            .synthesize("hello", &voice, &output, &fixture.settings)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"RIFF\x01\x02\x03");
        assert_eq!(engine.calls(), 1);
        assert_eq!(service.gate().available_permits(&fixture.settings), Some(1));
    }

    #[tokio::test]
    async fn test_failed_synthesis_removes_output_and_releases_permit() {
        let fixture = Fixture::new(&["alice.wav"]);
        let engine = Arc::new(StubSynthesis::new(b"RIFFpartial").failing());
        let (service, _) = service_with(engine);
        let output = fixture.output("broken.wav");
        let voice = service.resolve_voice(Some("alice"), &fixture.settings).unwrap();

        let err = service
            .synthesize("hello", &voice, &output, &fixture.settings)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SynthesisFailed(_)));
        assert!(!output.exists());
        assert_eq!(service.gate().available_permits(&fixture.settings), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_synthesis_bounded_by_limit() {
        let mut fixture = Fixture::new(&["alice.wav"]);
        fixture.settings.max_concurrent_synthesis = 2;
        let engine = Arc::new(StubSynthesis::new(b"RIFF").with_delay(Duration::from_millis(50)));
        let (service, _) = service_with(engine.clone());
        let service = Arc::new(service);
        let voice = service.resolve_voice(None, &fixture.settings).unwrap();

        let calls = (0..5).map(|i| {
            let service = service.clone();
            let settings = fixture.settings.clone();
            let voice = voice.clone();
            let output = fixture.output(&format!("{}.wav", i));
            tokio::spawn(async move {
                service
                    .synthesize("hello", &voice, &output, &settings)
                    .await
            })
        });
        for result in futures::future::join_all(calls).await {
            result.unwrap().unwrap();
        }

        assert_eq!(engine.calls(), 5);
        assert!(engine.max_in_flight() <= 2);
        assert_eq!(service.gate().available_permits(&fixture.settings), Some(2));
    }

    #[tokio::test]
    async fn test_synthesize_rejects_blank_text_and_missing_voice() {
        let fixture = Fixture::new(&["alice.wav"]);
        let engine = Arc::new(StubSynthesis::new(b"RIFF"));
        let (service, _) = service_with(engine.clone());
        let output = fixture.output("x.wav");
        let voice = service.resolve_voice(None, &fixture.settings).unwrap();

        let blank = service
            .synthesize("   ", &voice, &output, &fixture.settings)
            .await;
        assert!(matches!(blank, Err(Error::InvalidRequest(_))));

        let missing = service
            .synthesize("hi", &voice.with_file_name("ghost.wav"), &output, &fixture.settings)
            .await;
        assert!(matches!(missing, Err(Error::VoiceNotFound(_))));
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn test_resolve_voice_errors() {
        let empty = Fixture::new(&[]);
        let (service, _) = service_with(Arc::new(StubSynthesis::new(b"")));

        let err = service.resolve_voice(None, &empty.settings).unwrap_err();
        assert_eq!(err.to_string(), "no voice files available");

        let fixture = Fixture::new(&["a.wav", "b.wav"]);
        let err = service
            .resolve_voice(Some("missing"), &fixture.settings)
            .unwrap_err();
        assert_eq!(err.to_string(), "voice not found: missing");
    }

    #[tokio::test]
    async fn test_transcribe_trims_and_passes_language() {
        let fixture = Fixture::new(&[]);
        let (service, recognition) = service_with(Arc::new(StubSynthesis::new(b"")));
        let audio = fixture.dir.path().join("clip.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let text = service
            .transcribe(&audio, Some("en"), &fixture.settings)
            .await
            .unwrap();
        assert_eq!(text, "hello there");

        service
            .transcribe(&audio, Some("  "), &fixture.settings)
            .await
            .unwrap();

        let calls = recognition.last_engine().unwrap().calls();
        assert_eq!(calls[0].1.as_deref(), Some("en"));
        assert_eq!(calls[1].1, None);
    }

    #[tokio::test]
    async fn test_transcribe_reloads_once_on_model_change() {
        let mut fixture = Fixture::new(&[]);
        let (service, recognition) = service_with(Arc::new(StubSynthesis::new(b"")));
        let audio = fixture.dir.path().join("clip.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        fixture.settings.whisper_model_name = "base".to_string();
        service.transcribe(&audio, None, &fixture.settings).await.unwrap();

        fixture.settings.whisper_model_name = "small".to_string();
        service.transcribe(&audio, None, &fixture.settings).await.unwrap();

        assert_eq!(recognition.loaded_models(), vec!["base", "small"]);
        assert_eq!(recognition.last_engine().unwrap().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_transcript_is_ok() {
        let fixture = Fixture::new(&[]);
        let recognition = Arc::new(StubRecognitionLoader::with_text("   "));
        let service = SpeechService::with_loaders(
            Arc::new(StubSynthesisLoader::new()),
            recognition,
        );
        let audio = fixture.dir.path().join("silence.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let text = service.transcribe(&audio, None, &fixture.settings).await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_transcribe_payload_uses_temp_file() {
        let fixture = Fixture::new(&[]);
        let (service, recognition) = service_with(Arc::new(StubSynthesis::new(b"")));
        let payload = AudioPayload::new("data:audio/webm;base64,GkXfow==", "audio/webm;codecs=opus");

        let text = service
            .transcribe_payload(&payload, None, &fixture.settings)
            .await
            .unwrap();
        assert_eq!(text, "hello there");

        let (path, _, contents) = recognition.last_engine().unwrap().calls().remove(0);
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("webm"));
        assert_eq!(contents, vec![0x1a, 0x45, 0xdf, 0xa3]);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_transcribe_payload_rejects_bad_base64() {
        let fixture = Fixture::new(&[]);
        let (service, recognition) = service_with(Arc::new(StubSynthesis::new(b"")));
        let payload = AudioPayload::new("%%%", "audio/wav");

        let err = service
            .transcribe_payload(&payload, None, &fixture.settings)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DecodeFailed(_)));
        assert!(recognition.loaded_models().is_empty());
    }
}
