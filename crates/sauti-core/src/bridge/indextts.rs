//! IndexTTS2 synthesis through the Python daemon

use serde::Serialize;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::daemon::PythonDaemon;
use crate::config::Settings;
use crate::engine::{SynthesisEngine, SynthesisJob, SynthesisLoader, SynthesisParams};
use crate::error::{Error, Result};

const ENGINE_NAME: &str = "indextts";

#[derive(Debug, Serialize)]
struct InferRequest<'a> {
    command: &'static str,
    spk_audio_prompt: &'a Path,
    text: &'a str,
    output_path: &'a Path,
    #[serde(flatten)]
    params: &'a SynthesisParams,
}

/// Spawns an IndexTTS2 daemon from the checkpoints directory
#[derive(Debug, Default, Clone, Copy)]
pub struct IndexTtsLoader;

impl IndexTtsLoader {
    fn daemon_args(settings: &Settings) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--cfg-path".into(),
            settings.cfg_path().into(),
            "--model-dir".into(),
            settings.model_dir().into(),
        ];
        if settings.use_fp16 {
            args.push("--fp16".into());
        }
        if let Some(device) = settings.device() {
            args.push("--device".into());
            args.push(device.into());
        }
        match settings.use_cuda_kernel {
            Some(true) => args.push("--cuda-kernel".into()),
            Some(false) => args.push("--no-cuda-kernel".into()),
            None => {}
        }
        if settings.use_torch_compile {
            args.push("--compile".into());
        }
        args
    }
}

impl SynthesisLoader for IndexTtsLoader {
    fn load(&self, settings: &Settings) -> Result<Arc<dyn SynthesisEngine>> {
        let cfg_path = settings.cfg_path();
        if !cfg_path.is_file() {
            return Err(Error::ConfigurationUnavailable(format!(
                "synthesis config not found: {}",
                cfg_path.display()
            )));
        }

        let daemon = PythonDaemon::spawn(settings, ENGINE_NAME, Self::daemon_args(settings))?;
        Ok(Arc::new(IndexTtsEngine::new(daemon)))
    }
}

pub struct IndexTtsEngine {
    daemon: PythonDaemon,
}

impl IndexTtsEngine {
    pub fn new(daemon: PythonDaemon) -> Self {
        Self { daemon }
    }
}

impl SynthesisEngine for IndexTtsEngine {
    fn infer(&self, job: &SynthesisJob<'_>) -> Result<()> {
        debug!("IndexTTS request: {} chars -> {:?}", job.text.len(), job.output_path);

        let request = InferRequest {
            command: "synthesize",
            spk_audio_prompt: job.voice_path,
            text: job.text,
            output_path: job.output_path,
            params: job.params,
        };
        self.daemon.call(&request, Error::SynthesisFailed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::daemon::{read_frame, write_frame};
    use std::os::unix::net::UnixListener;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_daemon_args_follow_settings() {
        let settings = Settings {
            checkpoints_dir: "/ckpt".into(),
            device: Some("cuda:1".to_string()),
            use_fp16: false,
            use_cuda_kernel: Some(false),
            use_torch_compile: true,
            ..Default::default()
        };

        assert_eq!(
            strings(IndexTtsLoader::daemon_args(&settings)),
            vec![
                "--cfg-path",
                "/ckpt/config.yaml",
                "--model-dir",
                "/ckpt",
                "--device",
                "cuda:1",
                "--no-cuda-kernel",
                "--compile",
            ]
        );
    }

    #[test]
    fn test_request_carries_fixed_params() {
        let params = SynthesisParams::default();
        let request = InferRequest {
            command: "synthesize",
            spk_audio_prompt: Path::new("/voices/alice.wav"),
            text: "hello",
            output_path: Path::new("/tmp/out.wav"),
            params: &params,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["spk_audio_prompt"], "/voices/alice.wav");
        assert_eq!(json["num_beams"], 3);
        assert_eq!(json["max_mel_tokens"], 1500);
        assert_eq!(json["emo_vector"][7], 1.0);
        assert_eq!(json["interval_silence"], 200);
    }

    #[test]
    fn test_missing_config_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = Settings {
            checkpoints_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let err = IndexTtsLoader.load(&settings).err().unwrap();
        assert!(matches!(err, Error::ConfigurationUnavailable(_)));
    }

    #[test]
    fn test_synthesize_over_socket() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket = dir.path().join("indextts.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request: serde_json::Value =
                serde_json::from_slice(&read_frame(&mut stream).unwrap()).unwrap();
            write_frame(&mut stream, br#"{"status":"ok"}"#).unwrap();
            request
        });

        let engine = IndexTtsEngine::new(PythonDaemon::attach("indextts", &socket));
        let params = SynthesisParams::default();
        engine
            .infer(&SynthesisJob {
                voice_path: Path::new("/voices/alice.wav"),
                text: "hello",
                output_path: Path::new("/tmp/out.wav"),
                params: &params,
            })
            .unwrap();
        let request = server.join().unwrap();

        assert_eq!(request["command"], "synthesize");
        assert_eq!(request["text"], "hello");
        assert_eq!(request["output_path"], "/tmp/out.wav");
        assert_eq!(request["top_k"], 30);
    }
}
