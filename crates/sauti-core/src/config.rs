//! Configuration types for the Sauti speech service
//!
//! Every field can be overridden through a `SPEECH_SERVICE_`-prefixed
//! environment variable, e.g. `SPEECH_SERVICE_VOICES_DIR=/srv/voices` or
//! `SPEECH_SERVICE_CORS_ALLOW_ORIGINS=http://a.test,http://b.test`.

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Prefix shared by all environment overrides
pub const ENV_PREFIX: &str = "SPEECH_SERVICE";

/// Service settings. Read-only for the core: every call takes a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_allow_origins")]
    pub cors_allow_origins: Vec<String>,

    /// Synthesis checkpoints (`config.yaml` plus weights)
    #[serde(default = "default_checkpoints_dir")]
    pub checkpoints_dir: PathBuf,

    /// Directory of reference `.wav` files, one per voice
    #[serde(default = "default_voices_dir")]
    pub voices_dir: PathBuf,

    /// Download root for whisper weights
    #[serde(default = "default_whisper_model_dir")]
    pub whisper_model_dir: PathBuf,

    #[serde(default = "default_whisper_model_name")]
    pub whisper_model_name: String,

    /// Torch device string; unset or `auto` lets the engine pick
    #[serde(default)]
    pub device: Option<String>,

    #[serde(default = "default_use_fp16")]
    pub use_fp16: bool,

    /// Unset lets the engine decide
    #[serde(default)]
    pub use_cuda_kernel: Option<bool>,

    #[serde(default)]
    pub use_torch_compile: bool,

    #[serde(default = "default_max_concurrent_synthesis")]
    pub max_concurrent_synthesis: usize,

    /// Interpreter used to host the engine daemons
    #[serde(default = "default_python_cmd")]
    pub python_cmd: String,

    #[serde(default = "default_daemon_script")]
    pub daemon_script: PathBuf,

    /// Where daemon sockets live
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,

    /// Model loading can take minutes on a cold cache
    #[serde(default = "default_daemon_startup_timeout_secs")]
    pub daemon_startup_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allow_origins: default_cors_allow_origins(),
            checkpoints_dir: default_checkpoints_dir(),
            voices_dir: default_voices_dir(),
            whisper_model_dir: default_whisper_model_dir(),
            whisper_model_name: default_whisper_model_name(),
            device: None,
            use_fp16: default_use_fp16(),
            use_cuda_kernel: None,
            use_torch_compile: false,
            max_concurrent_synthesis: default_max_concurrent_synthesis(),
            python_cmd: default_python_cmd(),
            daemon_script: default_daemon_script(),
            runtime_dir: default_runtime_dir(),
            daemon_startup_timeout_secs: default_daemon_startup_timeout_secs(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn load() -> Result<Self> {
        Self::from_env(Environment::with_prefix(ENV_PREFIX))
    }

    /// Load settings from an explicit environment source
    pub fn from_env(env: Environment) -> Result<Self> {
        let env = env
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("cors_allow_origins");

        let settings = Config::builder()
            .add_source(env)
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    /// Engine configuration file inside the checkpoints directory
    pub fn cfg_path(&self) -> PathBuf {
        self.checkpoints_dir.join("config.yaml")
    }

    pub fn model_dir(&self) -> PathBuf {
        self.checkpoints_dir.clone()
    }

    /// Requested device, with `auto` and blank treated as unset
    pub fn device(&self) -> Option<&str> {
        self.device
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case("auto"))
    }

    /// Effective synthesis concurrency, never below one
    pub fn synthesis_limit(&self) -> usize {
        self.max_concurrent_synthesis.max(1)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_allow_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_checkpoints_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_voices_dir() -> PathBuf {
    PathBuf::from("voices")
}

fn default_whisper_model_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sauti")
        .join("whisper")
}

fn default_whisper_model_name() -> String {
    "base".to_string()
}

fn default_use_fp16() -> bool {
    true
}

fn default_max_concurrent_synthesis() -> usize {
    1
}

fn default_python_cmd() -> String {
    "python3".to_string()
}

fn default_daemon_script() -> PathBuf {
    std::env::current_dir()
        .map(|p| p.join("scripts/speech_daemon.py"))
        .unwrap_or_else(|_| PathBuf::from("scripts/speech_daemon.py"))
}

fn default_runtime_dir() -> PathBuf {
    std::env::temp_dir().join("sauti")
}

fn default_daemon_startup_timeout_secs() -> u64 {
    600
}
