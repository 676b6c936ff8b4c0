//! Engine lifecycle management
//!
//! The registry owns the two heavyweight engines and makes sure each one is
//! constructed at most once at a time. The two engines follow different
//! policies:
//!
//! - synthesis: first construction wins. Later settings changes (other
//!   checkpoints, device, precision) are ignored for the life of the registry.
//! - recognition: keyed by `whisper_model_name`. A different model name
//!   discards the held engine and loads a new one. A different `device` alone
//!   does NOT trigger a reload, so a device change only takes effect together
//!   with a model change. This looks like an oversight but is the established
//!   behavior; do not align the two policies without deciding which one is
//!   intended.
//!
//! Construction runs on the blocking pool while holding the slot lock, so
//! every other caller for that engine waits for it. The lock guard travels
//! into the blocking task: a caller that stops waiting does not release the
//! slot while a load is still running. Failed loads are never cached.

use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Settings;
use crate::engine::{RecognitionEngine, RecognitionLoader, SynthesisEngine, SynthesisLoader};
use crate::error::{Error, Result};

/// Lifecycle state of an engine slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Empty,
    Loading,
    Ready,
}

/// Snapshot of what is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub synthesis: SlotState,
    pub recognition: SlotState,
    pub recognition_model: Option<String>,
    pub recognition_device: Option<String>,
}

struct RecognitionHandle {
    model_name: String,
    /// Recorded for status only, never compared
    device: Option<String>,
    engine: Arc<dyn RecognitionEngine>,
}

/// Status published by the loaders, readable without touching the slot locks
type StatusCell = Arc<StdMutex<EngineStatus>>;

fn publish(status: &StatusCell, update: impl FnOnce(&mut EngineStatus)) {
    update(&mut status.lock().unwrap_or_else(PoisonError::into_inner));
}

/// Lazily constructed, memoized engines
pub struct EngineRegistry {
    synthesis_loader: Arc<dyn SynthesisLoader>,
    recognition_loader: Arc<dyn RecognitionLoader>,
    synthesis: Arc<Mutex<Option<Arc<dyn SynthesisEngine>>>>,
    recognition: Arc<Mutex<Option<RecognitionHandle>>>,
    status: StatusCell,
}

impl EngineRegistry {
    pub fn new(
        synthesis_loader: Arc<dyn SynthesisLoader>,
        recognition_loader: Arc<dyn RecognitionLoader>,
    ) -> Self {
        Self {
            synthesis_loader,
            recognition_loader,
            synthesis: Arc::new(Mutex::new(None)),
            recognition: Arc::new(Mutex::new(None)),
            status: Arc::new(StdMutex::new(EngineStatus {
                synthesis: SlotState::Empty,
                recognition: SlotState::Empty,
                recognition_model: None,
                recognition_device: None,
            })),
        }
    }

    /// Get the synthesis engine, constructing it on first use
    pub async fn synthesis_engine(&self, settings: &Settings) -> Result<Arc<dyn SynthesisEngine>> {
        let mut slot = self.synthesis.clone().lock_owned().await;
        if let Some(engine) = slot.as_ref() {
            return Ok(engine.clone());
        }

        info!(
            "Loading synthesis engine from {:?} (device: {:?}, fp16: {})",
            settings.checkpoints_dir,
            settings.device(),
            settings.use_fp16
        );

        let loader = self.synthesis_loader.clone();
        let status = self.status.clone();
        let settings = settings.clone();
        run_blocking(move || {
            publish(&status, |s| s.synthesis = SlotState::Loading);
            let engine = match loader.load(&settings) {
                Ok(engine) => engine,
                Err(e) => {
                    publish(&status, |s| s.synthesis = SlotState::Empty);
                    return Err(construction_failed(e));
                }
            };
            *slot = Some(engine.clone());
            publish(&status, |s| s.synthesis = SlotState::Ready);
            info!("Synthesis engine ready");
            Ok(engine)
        })
        .await
    }

    /// Get the recognition engine for `settings.whisper_model_name`,
    /// reloading when a different model is held
    pub async fn recognition_engine(
        &self,
        settings: &Settings,
    ) -> Result<Arc<dyn RecognitionEngine>> {
        let mut slot = self.recognition.clone().lock_owned().await;
        if let Some(handle) = slot.as_ref() {
            if handle.model_name == settings.whisper_model_name {
                return Ok(handle.engine.clone());
            }
            info!(
                "Recognition model changed ({} -> {}), reloading",
                handle.model_name, settings.whisper_model_name
            );
        } else {
            info!(
                "Loading recognition model {} (device: {:?})",
                settings.whisper_model_name,
                settings.device()
            );
        }

        let stale = slot.take();
        let loader = self.recognition_loader.clone();
        let status = self.status.clone();
        let settings = settings.clone();
        run_blocking(move || {
            publish(&status, |s| {
                s.recognition = SlotState::Loading;
                s.recognition_model = None;
                s.recognition_device = None;
            });
            // Release the stale model before loading the next one. Dropping a
            // daemon-backed engine blocks until the daemon exits.
            drop(stale);

            let engine = match loader.load(&settings) {
                Ok(engine) => engine,
                Err(e) => {
                    publish(&status, |s| s.recognition = SlotState::Empty);
                    return Err(construction_failed(e));
                }
            };
            let device = settings.device().map(String::from);
            *slot = Some(RecognitionHandle {
                model_name: settings.whisper_model_name.clone(),
                device: device.clone(),
                engine: engine.clone(),
            });
            publish(&status, |s| {
                s.recognition = SlotState::Ready;
                s.recognition_model = Some(settings.whisper_model_name.clone());
                s.recognition_device = device;
            });
            info!("Recognition model {} ready", settings.whisper_model_name);
            Ok(engine)
        })
        .await
    }

    pub fn is_synthesis_loaded(&self) -> bool {
        self.status().synthesis == SlotState::Ready
    }

    /// Status snapshot. Never waits on the slot locks, so it stays
    /// accurate while callers are being served from a loaded engine.
    pub fn status(&self) -> EngineStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn construction_failed(e: Error) -> Error {
    error!("Engine construction failed: {}", e);
    match e {
        Error::EngineConstructionFailed(_) => e,
        other => Error::EngineConstructionFailed(other.to_string()),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::EngineConstructionFailed(format!("loader task failed: {}", e)))?
}
